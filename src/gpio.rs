use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use stm32f0::stm32f0x1::{GPIOA, GPIOB, gpioa};

pub const MODE_INPUT : u32 = 0;
pub const MODE_OUTPUT: u32 = 1;
pub const MODE_ALT   : u32 = 2;

pub const PULL_NONE: u32 = 0;
pub const PULL_UP  : u32 = 1;

pub const SPEED_HIGH: u32 = 3;

const TRIG: u32 = 0;
const ECHO: u32 = 1;
const DEBUG_TX: u32 = 2;
const SCL: u32 = 8;
const SDA: u32 = 9;

/// Replace the two bit field of `pin` (MODER, PUPDR, OSPEEDR).
pub const fn set2(reg: u32, pin: u32, v: u32) -> u32 {
    reg & !(3 << pin * 2) | (v & 3) << pin * 2
}

/// Replace the alternate function nibble of `pin` in AFRL or AFRH.
pub const fn set4(reg: u32, pin: u32, af: u32) -> u32 {
    let shift = pin % 8 * 4;
    reg & !(15 << shift) | (af & 15) << shift
}

fn gpioa() -> &'static gpioa::RegisterBlock {unsafe {&*GPIOA::ptr()}}

/// Push-pull output on port A.
pub struct Output {
    pin: u32,
}

/// Input on port A.
pub struct Input {
    pin: u32,
}

impl ErrorType for Output {
    type Error = Infallible;
}

impl OutputPin for Output {
    fn set_low(&mut self) -> Result<(), Infallible> {
        gpioa().bsrr.write(|w| unsafe {w.bits(1 << self.pin + 16)});
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        gpioa().bsrr.write(|w| unsafe {w.bits(1 << self.pin)});
        Ok(())
    }
}

impl ErrorType for Input {
    type Error = Infallible;
}

impl InputPin for Input {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(gpioa().idr.read().bits() & 1 << self.pin != 0)
    }
    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(gpioa().idr.read().bits() & 1 << self.pin == 0)
    }
}

/// PA0 trigger (push-pull, starting low), PA1 echo (pulled up).
pub fn ranger_pins() -> (Output, Input) {
    let gpioa = gpioa();
    gpioa.bsrr.write(|w| unsafe {w.bits(1 << TRIG + 16)});
    gpioa.pupdr.modify(|r, w| unsafe {w.bits(set2(r.bits(), ECHO, PULL_UP))});
    gpioa.moder.modify(|r, w| unsafe {
        w.bits(set2(set2(r.bits(), TRIG, MODE_OUTPUT), ECHO, MODE_INPUT))});
    (Output {pin: TRIG}, Input {pin: ECHO})
}

/// PB8 SCL, PB9 SDA: open drain, AF1.
pub fn i2c_pins() {
    let gpiob = unsafe {&*GPIOB::ptr()};
    let both = |reg: u32, v: u32| set2(set2(reg, SCL, v), SDA, v);
    gpiob.otyper.modify(|r, w| unsafe {w.bits(r.bits() | 1 << SCL | 1 << SDA)});
    gpiob.ospeedr.modify(|r, w| unsafe {w.bits(both(r.bits(), SPEED_HIGH))});
    gpiob.pupdr.modify(|r, w| unsafe {w.bits(both(r.bits(), PULL_NONE))});
    gpiob.afrh.modify(|r, w| unsafe {w.bits(set4(set4(r.bits(), SCL, 1), SDA, 1))});
    gpiob.moder.modify(|r, w| unsafe {w.bits(both(r.bits(), MODE_ALT))});
}

/// PA2 USART2 TX, AF1.
pub fn debug_pin() {
    let gpioa = gpioa();
    gpioa.afrl.modify(|r, w| unsafe {w.bits(set4(r.bits(), DEBUG_TX, 1))});
    gpioa.moder.modify(|r, w| unsafe {
        w.bits(set2(r.bits(), DEBUG_TX, MODE_ALT))});
}

#[test]
fn pin_fields() {
    assert_eq!(set2(!0, TRIG, MODE_OUTPUT) & 0xf, 0b1101);
    assert_eq!(set2(0, ECHO, PULL_UP), 1 << 2);
    assert_eq!(set2(0, SDA, MODE_ALT), 2 << 18);
    assert_eq!(set2(!0, SCL, PULL_NONE), !(3 << 16));
    // Values wider than the field do not spill.
    assert_eq!(set2(0, 1, 5), 1 << 2);
}

#[test]
fn alternate_functions() {
    assert_eq!(set4(0, DEBUG_TX, 1), 1 << 8);
    assert_eq!(set4(set4(0, SCL, 1), SDA, 1), 0x11);
    assert_eq!(set4(!0, SDA, 0), !0xf0);
    assert_eq!(set4(0, 15, 0x1f), 0xf << 28);
}
