//! Microsecond time base on TIM1, millisecond delays on SysTick, and a
//! free-running microsecond count on TIM2.
//!
//! TIM1 runs with its update flag set once per microsecond.  Nothing takes
//! the update interrupt, delays poll the flag and clear it on every sighting,
//! so a count of sightings is a count of microseconds.  TIM2 is 32 bits wide
//! on the F0; left counting at 1MHz its CNT is the `now()` time base.

use cortex_m::peripheral::{SYST, syst};
use embedded_hal::delay::DelayNs;
use stm32f0::stm32f0x1::{TIM1, TIM2, tim1, tim2};

use crate::cpu::{self, Config};

const SYST_ENABLE   : u32 = 1;
const SYST_CLKSOURCE: u32 = 1 << 2;
const SYST_COUNTFLAG: u32 = 1 << 16;

/// Timer counter rate.  Counting 0, 1 with ARR = 1 gives an update per µs.
const COUNT_HZ: u32 = 2_000_000;

const fn prescale(clk: u32, hz: u32) -> u32 {clk / hz - 1}

/// A flag raised once per tick.
pub trait TickFlag {
    fn start(&self, clk: u32);
    fn pending(&self) -> bool;
    fn clear(&self);
}

impl TickFlag for tim1::RegisterBlock {
    fn start(&self, clk: u32) {
        self.cr1.reset();
        self.psc.write(|w| unsafe {w.bits(prescale(clk, COUNT_HZ))});
        self.arr.write(|w| unsafe {w.bits(1)});
        self.cnt.reset();
        // URS keeps the UG below from raising UIF.
        self.cr1.write(|w| w.urs().set_bit());
        self.egr.write(|w| w.ug().set_bit());
        self.clear();
        self.cr1.write(|w| w.urs().set_bit().cen().set_bit());
    }
    fn pending(&self) -> bool {self.sr.read().uif().bit_is_set()}
    // rc_w0, and UIF is the only flag in use.
    fn clear(&self) {self.sr.reset()}
}

/// Free-running microsecond counter, wrapping at 32 bits.
pub trait Counter {
    fn run(&self, clk: u32);
    fn count(&self) -> u32;
}

impl Counter for tim2::RegisterBlock {
    fn run(&self, clk: u32) {
        self.cr1.reset();
        self.psc.write(|w| unsafe {w.bits(prescale(clk, 1_000_000))});
        self.arr.write(|w| w.bits(u32::MAX));
        self.cnt.reset();
        // Load PSC now rather than at the first overflow.
        self.egr.write(|w| w.ug().set_bit());
        self.cr1.write(|w| w.cen().set_bit());
    }
    fn count(&self) -> u32 {self.cnt.read().bits()}
}

/// One shot down counter, flagging each time it passes zero.
pub trait Countdown {
    fn arm(&self, reload: u32);
    /// Reading the flag clears it.
    fn done(&self) -> bool;
    fn disarm(&self);
}

impl Countdown for syst::RegisterBlock {
    fn arm(&self, reload: u32) {
        unsafe {
            self.rvr.write(reload);
            self.cvr.write(0);
            self.csr.write(SYST_ENABLE | SYST_CLKSOURCE);
        }
    }
    fn done(&self) -> bool {self.csr.read() & SYST_COUNTFLAG != 0}
    fn disarm(&self) {unsafe {self.csr.write(0)}}
}

pub struct Clock<'a, T: TickFlag = tim1::RegisterBlock,
                 S: Countdown = syst::RegisterBlock,
                 C: Counter = tim2::RegisterBlock> {
    tim: &'a T,
    syst: &'a S,
    counter: &'a C,
    clk: u32,
}

impl Clock<'static> {
    pub fn hw(config: &Config) -> Self {
        unsafe {
            Clock::new(&*TIM1::ptr(), &*SYST::PTR, &*TIM2::ptr(), config.clk)
        }
    }
}

impl<'a, T: TickFlag, S: Countdown, C: Counter> Clock<'a, T, S, C> {
    pub fn new(tim: &'a T, syst: &'a S, counter: &'a C, clk: u32) -> Self {
        Clock {tim, syst, counter, clk}
    }

    pub fn init(&mut self) {
        self.tim.start(self.clk);
        self.counter.run(self.clk);
    }

    pub fn delay_us(&mut self, n: u32) {
        let mut seen = 0;
        while seen < n {
            if self.tim.pending() {
                self.tim.clear();
                seen += 1;
            }
        }
    }

    pub fn delay_ms(&mut self, n: u32) {
        if n == 0 {
            return;
        }
        self.syst.arm(self.clk / 1000 - 1);
        for _ in 0..n {
            while !self.syst.done() {
            }
        }
        self.syst.disarm();
    }

    /// Microseconds since `init`, wrapping.
    pub fn now(&self) -> u32 {self.counter.count()}

    pub fn elapsed(&self, since: u32) -> u32 {self.now().wrapping_sub(since)}
}

impl<T: TickFlag, S: Countdown, C: Counter> DelayNs for Clock<'_, T, S, C> {
    fn delay_ns(&mut self, ns: u32) {
        Self::delay_us(self, ns.div_ceil(1000));
    }
    fn delay_us(&mut self, us: u32) {
        Self::delay_us(self, us);
    }
    fn delay_ms(&mut self, ms: u32) {
        Self::delay_ms(self, ms);
    }
}

impl Config {
    pub const fn timer(&mut self) -> &mut Self {
        assert!(self.clk % COUNT_HZ == 0);
        self.clocks(0, cpu::APB1_TIM2, cpu::APB2_TIM1)
    }
}

#[cfg(test)]
use crate::sim::{SimTick, SimSysTick};

#[test]
fn prescalers() {
    assert_eq!(prescale(48_000_000, COUNT_HZ), 23);
    assert_eq!(prescale(8_000_000, COUNT_HZ), 3);
    assert_eq!(prescale(48_000_000, 1_000_000), 47);
    assert_eq!(prescale(8_000_000, 1_000_000), 7);
}

#[test]
fn counts_microseconds() {
    let tick = SimTick::new(3);
    let syst = SimSysTick::new(2);
    let mut clock = Clock::new(&tick, &syst, &tick, 48_000_000);
    clock.init();
    assert_eq!(tick.started(), Some(48_000_000));
    assert_eq!(tick.running(), Some(48_000_000));
    let t0 = clock.now();
    clock.delay_us(5);
    assert_eq!(tick.cleared(), 5);
    assert_eq!(clock.elapsed(t0), 5);
    clock.delay_us(0);
    assert_eq!(tick.cleared(), 5);
}

#[test]
fn elapsed_includes_other_work() {
    let tick = SimTick::new(1);
    let syst = SimSysTick::new(1);
    let mut clock = Clock::new(&tick, &syst, &tick, 48_000_000);
    let t0 = clock.now();
    clock.delay_us(10);
    // An I²C transfer, say, that never touched the clock.
    tick.advance(250);
    assert_eq!(clock.elapsed(t0), 260);
}

#[test]
fn systick_milliseconds() {
    let tick = SimTick::new(1);
    let syst = SimSysTick::new(4);
    let mut clock = Clock::new(&tick, &syst, &tick, 48_000_000);
    clock.delay_ms(3);
    assert_eq!(syst.reload(), Some(47_999));
    assert_eq!(syst.expiries(), 3);
    assert!(!syst.armed());
    clock.delay_ms(0);
    assert_eq!(syst.expiries(), 3);
    let t0 = clock.now();
    DelayNs::delay_us(&mut clock, 7);
    DelayNs::delay_ns(&mut clock, 1001);
    assert_eq!(clock.elapsed(t0), 9);
}

#[test]
fn ticks_wrap() {
    let tick = SimTick::new(1);
    let syst = SimSysTick::new(1);
    let mut clock = Clock::new(&tick, &syst, &tick, 8_000_000);
    tick.advance(u32::MAX - 1);
    let t0 = clock.now();
    clock.delay_us(4);
    assert_eq!(clock.now(), 2);
    assert_eq!(clock.elapsed(t0), 4);
}

#[test]
fn timer_config() {
    assert_ne!(crate::CONFIG.apb2_clocks & cpu::APB2_TIM1, 0);
    assert_ne!(crate::CONFIG.apb1_clocks & cpu::APB1_TIM2, 0);
}
