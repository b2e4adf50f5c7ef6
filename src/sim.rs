//! Simulated peripherals for host tests.
//!
//! `SimI2c` answers the I²C register interface the way the F0 block does for
//! the flags the driver looks at, with a set of devices on the bus.  `Time`,
//! `SimDelay`, `SimTrigger` and `SimEcho` give the rangefinder a shared
//! nanosecond time base and an echo that follows the last trigger pulse.
//! `SimTick` and `SimSysTick` stand in for the TIM1 flag, the TIM2 counter
//! and SysTick.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::i2c::{
    ICR_ALL, ISR_ARLO, ISR_BERR, ISR_BUSY, ISR_NACKF, ISR_OVR, ISR_RXNE,
    ISR_STOPF, ISR_TC, ISR_TCR, ISR_TXIS, Regs, Timing, Transfer};
use crate::timer::{Countdown, Counter, TickFlag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start {addr: u8, read: bool, nbytes: u8, reload: bool, autoend: bool},
    /// NBYTES reprogrammed after TCR.
    Reload {nbytes: u8, reload: bool},
    Tx(u8),
    Rx(u8),
    /// STOP on the wire, whether requested, AUTOEND or after a NACK.
    Stop,
    Enable(bool),
}

#[derive(Default)]
struct State {
    enabled: bool,
    xfer: Option<Transfer>,
    timing: Option<Timing>,
    isr: u32,
    busy: bool,
    remaining: u32,
    devices: Vec<u8>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    received: usize,
    log: Vec<Event>,
    /// Data bytes acknowledged before the next one is NACKed.
    nack_after: Option<usize>,
    /// One shot BERR once this many bytes have gone out.
    bus_error_after: Option<usize>,
    /// One shot OVR once this many bytes have come in.
    overrun_after: Option<usize>,
    hold_busy: bool,
    mute: bool,
    mute_reads: bool,
    ignore_stop: bool,
    lose_arbitration: bool,
}

#[derive(Default)]
pub struct SimI2c(RefCell<State>);

impl SimI2c {
    pub fn with_devices(devices: &[u8]) -> SimI2c {
        let sim = SimI2c::default();
        sim.0.borrow_mut().devices = devices.to_vec();
        sim
    }
    pub fn queue_rx(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes);
    }
    pub fn nack_after(&self, n: usize) {self.0.borrow_mut().nack_after = Some(n)}
    pub fn bus_error_after(&self, n: usize) {
        self.0.borrow_mut().bus_error_after = Some(n)
    }
    pub fn overrun_after(&self, n: usize) {
        self.0.borrow_mut().overrun_after = Some(n)
    }
    pub fn hold_busy(&self, b: bool) {self.0.borrow_mut().hold_busy = b}
    /// Neither TXIS nor RXNE ever rises.
    pub fn mute(&self, b: bool) {self.0.borrow_mut().mute = b}
    /// Writes go through, RXNE never rises.
    pub fn mute_reads(&self, b: bool) {self.0.borrow_mut().mute_reads = b}
    /// A requested STOP does nothing; only PE going low frees the bus.
    pub fn ignore_stop(&self, b: bool) {self.0.borrow_mut().ignore_stop = b}
    pub fn lose_arbitration(&self, b: bool) {
        self.0.borrow_mut().lose_arbitration = b
    }

    pub fn log(&self) -> Vec<Event> {self.0.borrow().log.clone()}
    pub fn transmitted(&self) -> Vec<u8> {self.0.borrow().tx.clone()}
    pub fn busy(&self) -> bool {
        let s = self.0.borrow();
        s.busy || s.hold_busy
    }
    pub fn timing(&self) -> Timing {
        self.0.borrow().timing.unwrap_or(Timing::RESET)
    }
    /// Last CR2 programme.
    pub fn programmed(&self) -> Option<Transfer> {self.0.borrow().xfer}
}

impl State {
    fn stop(&mut self) {
        self.log.push(Event::Stop);
        self.isr = self.isr & !(ISR_TC | ISR_TCR | ISR_TXIS | ISR_RXNE)
            | ISR_STOPF;
        self.busy = false;
    }
    fn nack(&mut self) {
        self.isr |= ISR_NACKF;
        self.stop();
    }
    /// Raise the flag for the next byte, or end the chunk.
    fn next(&mut self) {
        let Some(xfer) = self.xfer else {return};
        if self.remaining == 0 {
            if xfer.reload {
                self.isr |= ISR_TCR;
            }
            else if xfer.autoend {
                self.stop();
            }
            else {
                self.isr |= ISR_TC;
            }
        }
        else if self.mute {
        }
        else if xfer.read {
            if !self.mute_reads {
                self.isr |= ISR_RXNE;
            }
        }
        else {
            self.isr |= ISR_TXIS;
        }
    }
}

impl Regs for SimI2c {
    fn isr(&self) -> u32 {
        let s = self.0.borrow();
        s.isr | if s.busy || s.hold_busy {ISR_BUSY} else {0}
    }
    fn clear(&self, flags: u32) {
        self.0.borrow_mut().isr &= !(flags & ICR_ALL);
    }
    fn enable(&self, on: bool) {
        let mut s = self.0.borrow_mut();
        s.log.push(Event::Enable(on));
        s.enabled = on;
        if !on {
            s.isr = 0;
            s.busy = false;
        }
    }
    fn enabled(&self) -> bool {self.0.borrow().enabled}
    fn set_timing(&self, timing: Timing) {
        self.0.borrow_mut().timing = Some(timing)
    }
    fn program(&self, xfer: Transfer, start: bool) {
        let mut s = self.0.borrow_mut();
        let resume = !start && s.isr & ISR_TCR != 0;
        s.xfer = Some(xfer);
        if start {
            s.isr &= !(ISR_TC | ISR_TCR);
            s.log.push(Event::Start {
                addr: xfer.addr, read: xfer.read, nbytes: xfer.nbytes,
                reload: xfer.reload, autoend: xfer.autoend});
            s.busy = true;
            if s.lose_arbitration {
                s.isr |= ISR_ARLO;
                s.busy = false;
            }
            else if !s.devices.contains(&xfer.addr) {
                s.nack();
            }
            else {
                s.remaining = xfer.nbytes as u32;
                s.next();
            }
        }
        else if resume {
            s.isr &= !ISR_TCR;
            s.log.push(Event::Reload {nbytes: xfer.nbytes, reload: xfer.reload});
            s.remaining = xfer.nbytes as u32;
            s.next();
        }
    }
    fn stop(&self) {
        let mut s = self.0.borrow_mut();
        if !s.ignore_stop {
            s.stop();
        }
    }
    fn txdr(&self, b: u8) {
        let mut s = self.0.borrow_mut();
        s.isr &= !ISR_TXIS;
        s.tx.push(b);
        s.log.push(Event::Tx(b));
        let sent = s.tx.len();
        if s.nack_after.is_some_and(|n| sent > n) {
            s.nack();
            return;
        }
        if s.bus_error_after.is_some_and(|n| sent > n) {
            s.bus_error_after = None;
            s.isr |= ISR_BERR;
            return;
        }
        s.remaining = s.remaining.saturating_sub(1);
        s.next();
    }
    fn rxdr(&self) -> u8 {
        let mut s = self.0.borrow_mut();
        s.isr &= !ISR_RXNE;
        let b = s.rx.pop_front().unwrap_or(0xff);
        s.log.push(Event::Rx(b));
        s.received += 1;
        let received = s.received;
        if s.overrun_after.is_some_and(|n| received >= n) {
            s.overrun_after = None;
            s.isr |= ISR_OVR;
            return b;
        }
        s.remaining = s.remaining.saturating_sub(1);
        s.next();
        b
    }
}

/// Shared simulated time, in nanoseconds.
#[derive(Clone, Default)]
pub struct Time(Rc<Cell<u64>>);

impl Time {
    pub fn us(&self) -> u64 {self.0.get() / 1000}
    pub fn advance(&self, ns: u64) {self.0.set(self.0.get() + ns)}
}

pub struct SimDelay(pub Time);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance(ns as u64);
    }
}

/// Trigger output recording each level change with its time in µs.
#[derive(Clone)]
pub struct SimTrigger {
    time: Time,
    pub edges: Rc<RefCell<Vec<(u64, bool)>>>,
}

impl SimTrigger {
    pub fn new(time: &Time) -> SimTrigger {
        SimTrigger {time: time.clone(), edges: Default::default()}
    }
    fn level(&self) -> bool {
        self.edges.borrow().last().is_some_and(|e| e.1)
    }
    fn set(&mut self, level: bool) {
        // Record changes only; repeated writes of the same level are idle.
        if self.level() != level || self.edges.borrow().is_empty() {
            self.edges.borrow_mut().push((self.time.us(), level));
        }
    }
    /// Time of the last high to low transition.
    fn fired(&self) -> Option<u64> {
        let edges = self.edges.borrow();
        edges.windows(2).rev()
            .find(|w| w[0].1 && !w[1].1)
            .map(|w| w[1].0)
    }
}

impl ErrorType for SimTrigger {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimTrigger {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

/// Echo input: high for `width` µs starting `delay` µs after each trigger
/// pulse ends.  `width` of None means the echo never falls, `delay` of None
/// means it never rises.
pub struct SimEcho {
    time: Time,
    trigger: SimTrigger,
    pub delay: Option<u64>,
    pub width: Option<u64>,
}

impl SimEcho {
    pub fn new(trigger: &SimTrigger, delay: Option<u64>, width: Option<u64>)
               -> SimEcho {
        SimEcho {time: trigger.time.clone(), trigger: trigger.clone(),
                 delay, width}
    }
    fn level(&self) -> bool {
        let (Some(fired), Some(delay)) = (self.trigger.fired(), self.delay)
        else {return false};
        let now = self.time.us();
        let rise = fired + delay;
        now >= rise && self.width.is_none_or(|w| now < rise + w)
    }
}

impl ErrorType for SimEcho {
    type Error = core::convert::Infallible;
}

impl InputPin for SimEcho {
    fn is_high(&mut self) -> Result<bool, Self::Error> {Ok(self.level())}
    fn is_low(&mut self) -> Result<bool, Self::Error> {Ok(!self.level())}
}

/// Timer update flag raised on every `every`th poll until cleared, and a
/// free-running microsecond count that moves on with each raise.
pub struct SimTick {
    every: u32,
    polls: Cell<u32>,
    cleared: Cell<u32>,
    started: Cell<Option<u32>>,
    count: Cell<u32>,
    running: Cell<Option<u32>>,
}

impl SimTick {
    pub fn new(every: u32) -> SimTick {
        SimTick {every, polls: Cell::new(0), cleared: Cell::new(0),
                 started: Cell::new(None), count: Cell::new(0),
                 running: Cell::new(None)}
    }
    pub fn cleared(&self) -> u32 {self.cleared.get()}
    pub fn started(&self) -> Option<u32> {self.started.get()}
    pub fn running(&self) -> Option<u32> {self.running.get()}
    /// Time passing outside the clock's own delays.
    pub fn advance(&self, us: u32) {
        self.count.set(self.count.get().wrapping_add(us));
    }
}

impl TickFlag for SimTick {
    fn start(&self, clk: u32) {self.started.set(Some(clk))}
    fn pending(&self) -> bool {
        self.polls.set(self.polls.get() + 1);
        if self.polls.get() == self.every {
            self.advance(1);
        }
        self.polls.get() >= self.every
    }
    fn clear(&self) {
        self.polls.set(0);
        self.cleared.set(self.cleared.get() + 1);
    }
}

impl Counter for SimTick {
    fn run(&self, clk: u32) {self.running.set(Some(clk))}
    fn count(&self) -> u32 {self.count.get()}
}

/// SysTick passing zero on every `every`th poll of the flag.
pub struct SimSysTick {
    every: u32,
    polls: Cell<u32>,
    expiries: Cell<u32>,
    reload: Cell<Option<u32>>,
    armed: Cell<bool>,
}

impl SimSysTick {
    pub fn new(every: u32) -> SimSysTick {
        SimSysTick {every, polls: Cell::new(0), expiries: Cell::new(0),
                    reload: Cell::new(None), armed: Cell::new(false)}
    }
    pub fn expiries(&self) -> u32 {self.expiries.get()}
    pub fn reload(&self) -> Option<u32> {self.reload.get()}
    pub fn armed(&self) -> bool {self.armed.get()}
}

impl Countdown for SimSysTick {
    fn arm(&self, reload: u32) {
        self.reload.set(Some(reload));
        self.armed.set(true);
    }
    fn done(&self) -> bool {
        assert!(self.armed.get());
        self.polls.set(self.polls.get() + 1);
        if self.polls.get() < self.every {
            return false;
        }
        self.polls.set(0);
        self.expiries.set(self.expiries.get() + 1);
        true
    }
    fn disarm(&self) {self.armed.set(false)}
}
