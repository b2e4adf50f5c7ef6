//! HC-SR04 style trigger/echo rangefinder.
//!
//! A 10µs trigger pulse starts a burst; the sensor then holds the echo line
//! high for the round trip time of the sound.  Both the wait for the echo
//! to rise and its high time are counted in 1µs delays, each phase giving up
//! once the count reaches the timeout.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::cpu::{self, Config};

macro_rules!dbgln {($($tt:tt)*) => {if false {crate::dbgln!($($tt)*)}};}

/// Round trip microseconds per centimetre.
pub const TICKS_PER_CM: u32 = 58;

pub const TRIGGER_US: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Echo never went high.
    EchoRise,
    /// Echo went high and stayed there.
    EchoFall,
    /// A pin reported an error.
    Pin,
}

/// Result of one ranging cycle.  `duration` is in ticks (µs) and is zero
/// whenever `valid` is false.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub duration: u32,
    pub valid: bool,
    pub distance: u32,
    pub fault: Option<Error>,
}

impl Measurement {
    pub const NONE: Measurement = Measurement {
        duration: 0, valid: false, distance: 0, fault: None};

    pub const fn from_echo(duration: u32) -> Measurement {
        Measurement {
            duration, valid: true, distance: distance_cm(duration),
            fault: None}
    }

    pub const fn failed(error: Error) -> Measurement {
        Measurement {fault: Some(error), ..Measurement::NONE}
    }

    /// Distance in cm, if there was one.
    pub fn distance(&self) -> Option<u32> {
        self.valid.then_some(self.distance)
    }
}

pub const fn distance_cm(ticks: u32) -> u32 {ticks / TICKS_PER_CM}

pub struct Ranger<T, E, D> {
    trig: T,
    echo: E,
    delay: D,
    settle_ms: u32,
    last: Measurement,
}

impl<T: OutputPin, E: InputPin, D: DelayNs> Ranger<T, E, D> {
    pub fn new(trig: T, echo: E, delay: D, settle_ms: u32) -> Self {
        Ranger {trig, echo, delay, settle_ms, last: Measurement::NONE}
    }

    #[allow(dead_code)]
    pub fn set_settle(&mut self, ms: u32) {self.settle_ms = ms}

    /// Most recent `measure` result.
    pub fn last(&self) -> &Measurement {&self.last}

    pub fn trigger(&mut self) -> Result<(), Error> {
        self.trig.set_low().map_err(|_| Error::Pin)?;
        self.delay.delay_us(TRIGGER_US);
        self.trig.set_high().map_err(|_| Error::Pin)?;
        self.delay.delay_us(TRIGGER_US);
        self.trig.set_low().map_err(|_| Error::Pin)
    }

    /// Echo high time in ticks.  Each phase may run to `timeout` ticks; the
    /// count never passes `timeout`, whatever its value.
    pub fn read_echo(&mut self, timeout: u32) -> Result<u32, Error> {
        let mut count = 0;
        while self.echo.is_low().map_err(|_| Error::Pin)? {
            if count == timeout {
                return Err(Error::EchoRise);
            }
            self.delay.delay_us(1);
            count += 1;
        }
        let mut count = 0;
        while self.echo.is_high().map_err(|_| Error::Pin)? {
            if count == timeout {
                return Err(Error::EchoFall);
            }
            self.delay.delay_us(1);
            count += 1;
        }
        Ok(count)
    }

    /// Trigger, time the echo and wait out the settle time.
    pub fn measure(&mut self, timeout: u32) -> Measurement {
        let m = match self.trigger().and_then(|_| self.read_echo(timeout)) {
            Ok(duration) => Measurement::from_echo(duration),
            Err(e) => {
                dbgln!("Echo {e:?} after {timeout} ticks");
                Measurement::failed(e)
            }
        };
        self.last = m;
        self.delay.delay_ms(self.settle_ms);
        m
    }

    #[allow(dead_code)]
    pub fn release(self) -> (T, E, D) {(self.trig, self.echo, self.delay)}
}

impl Config {
    pub const fn ranger(&mut self) -> &mut Self {
        self.echo_timeout = 400_000;
        self.settle_ms = 1000;
        self.clocks(cpu::AHB_IOPA, 0, 0)
    }
}

#[cfg(test)]
use crate::CONFIG;
#[cfg(test)]
use crate::sim::{SimDelay, SimEcho, SimTrigger, Time};

#[cfg(test)]
type SimRanger = Ranger<SimTrigger, SimEcho, SimDelay>;

/// Echo rising `delay` µs after the trigger, lasting `width` µs.
#[cfg(test)]
fn sim_ranger(delay: Option<u64>, width: Option<u64>, settle_ms: u32)
              -> (SimRanger, Time) {
    let time = Time::default();
    let trig = SimTrigger::new(&time);
    let echo = SimEcho::new(&trig, delay, width);
    (Ranger::new(trig, echo, SimDelay(time.clone()), settle_ms), time)
}

#[test]
fn ten_centimetres() {
    assert_eq!(distance_cm(580), 10);
    assert_eq!(distance_cm(57), 0);
    let (mut ranger, _) = sim_ranger(Some(150), Some(580), 0);
    let m = ranger.measure(400_000);
    assert_eq!(m, Measurement {duration: 580, valid: true, distance: 10,
                               fault: None});
    assert_eq!(m.distance(), Some(10));
}

#[test]
fn twenty_centimetres() {
    let (mut ranger, _) = sim_ranger(Some(400), Some(1160), 0);
    let m = ranger.measure(CONFIG.echo_timeout);
    assert_eq!(m.duration, 1160);
    assert_eq!(m.distance(), Some(20));
    assert_eq!(*ranger.last(), m);
}

#[test]
fn no_target() {
    let (mut ranger, _) = sim_ranger(None, None, 0);
    for _ in 0..2 {
        let m = ranger.measure(CONFIG.echo_timeout);
        assert!(!m.valid);
        assert_eq!(m.duration, 0);
        assert_eq!(m.distance(), None);
        assert_eq!(m.fault, Some(Error::EchoRise));
    }
}

#[test]
fn rise_timeout_boundary() {
    let (mut ranger, _) = sim_ranger(Some(100), Some(58), 0);
    assert_eq!(ranger.measure(100).distance(), Some(1));
    let (mut ranger, _) = sim_ranger(Some(101), Some(58), 0);
    assert_eq!(ranger.measure(100).fault, Some(Error::EchoRise));
}

#[test]
fn fall_timeout_boundary() {
    let (mut ranger, _) = sim_ranger(Some(5), Some(100), 0);
    assert_eq!(ranger.measure(100).duration, 100);
    let (mut ranger, _) = sim_ranger(Some(5), Some(101), 0);
    let m = ranger.measure(100);
    assert_eq!(m, Measurement::failed(Error::EchoFall));
    let (mut ranger, _) = sim_ranger(Some(5), None, 0);
    assert_eq!(ranger.measure(100).fault, Some(Error::EchoFall));
}

#[test]
fn trigger_pulse() {
    let (mut ranger, time) = sim_ranger(Some(20), Some(58), 0);
    time.advance(3_000);
    ranger.measure(1000);
    let (trig, _, _) = ranger.release();
    let edges = trig.edges.borrow().clone();
    assert_eq!(edges, [(3, false), (13, true), (23, false)]);
}

#[test]
fn settles_after_measuring() {
    let (mut ranger, time) = sim_ranger(Some(10), Some(580), CONFIG.settle_ms);
    ranger.measure(1000);
    // Trigger 20µs, rise 10µs, echo 580µs, then the settle time.
    assert_eq!(time.us(), 20 + 10 + 580 + 1_000_000);
    ranger.set_settle(0);
    let t0 = time.us();
    ranger.measure(1000);
    assert_eq!(time.us() - t0, 20 + 10 + 580);

    // A timeout still settles.
    let (mut ranger, time) = sim_ranger(None, None, 5);
    ranger.measure(50);
    assert_eq!(time.us(), 20 + 50 + 5000);
}

#[test]
fn extreme_timeouts() {
    let (mut ranger, _) = sim_ranger(Some(30), Some(116), 0);
    assert_eq!(ranger.measure(u32::MAX).distance(), Some(2));
    // Zero allows no ticks in either phase.
    let (mut ranger, _) = sim_ranger(Some(0), Some(58), 0);
    assert_eq!(ranger.measure(0).fault, Some(Error::EchoFall));
    let (mut ranger, _) = sim_ranger(Some(1), Some(58), 0);
    assert_eq!(ranger.measure(0).fault, Some(Error::EchoRise));
}

#[test]
fn ranger_config() {
    assert_eq!(CONFIG.echo_timeout, 400_000);
    assert_eq!(CONFIG.settle_ms, 1000);
    assert_ne!(CONFIG.ahb_clocks & cpu::AHB_IOPA, 0);
}
