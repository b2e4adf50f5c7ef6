//! Polled debug output on USART2 TX (PA2).

use core::fmt::Write;

use stm32f0::stm32f0x1::USART2;

use crate::cpu::{self, Config};
use crate::gpio;
use crate::vcell::VCell;

/// Nothing goes to the UART before `init`.
static ENABLED: VCell<bool> = VCell::new(false);

pub struct DebugS;

const fn brr(clk: u32, baud: u32) -> u32 {(clk * 2 / baud + 1) / 2}

pub fn init(config: &Config) {
    let brr = brr(config.clk, config.baud);
    assert!(brr >= 16 && brr < 65536);
    gpio::debug_pin();
    let usart = unsafe {&*USART2::ptr()};
    usart.brr.write(|w| unsafe {w.bits(brr)});
    usart.cr1.write(|w| w.ue().set_bit().te().set_bit());
    ENABLED.write(true);
}

fn sdebug_bytes(s: &[u8]) -> core::fmt::Result {
    if cfg!(test) || !ENABLED.read() {
        return Ok(());
    }
    let usart = unsafe {&*USART2::ptr()};
    for &b in s {
        while usart.isr.read().txe().bit_is_clear() {
        }
        usart.tdr.write(|w| unsafe {w.bits(b as u32)});
    }
    Ok(())
}

/// Wait for the last byte to leave the shift register.
#[allow(dead_code)]
pub fn drain() {
    if cfg!(test) || !ENABLED.read() {
        return;
    }
    let usart = unsafe {&*USART2::ptr()};
    while usart.isr.read().tc().bit_is_clear() {
    }
}

impl Write for DebugS {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        sdebug_bytes(s.as_bytes())
    }
    fn write_char(&mut self, c: char) -> core::fmt::Result {
        sdebug_bytes(c.encode_utf8(&mut [0; 4]).as_bytes())
    }
}

#[macro_export]
macro_rules! dbgln {
    () => ({let _ = core::fmt::Write::write_str(
        &mut $crate::debug::DebugS, "\n");});
    ($($tt:tt)*) => ({
        let _ = core::fmt::Write::write_fmt(
            &mut $crate::debug::DebugS, format_args!($($tt)*));
        let _ = core::fmt::Write::write_str(&mut $crate::debug::DebugS, "\n");
    });
}

/// As `dbgln!`, but returns only once the line is out on the wire.
#[macro_export]
macro_rules! sdbgln {
    ($($tt:tt)*) => ({
        $crate::dbgln!($($tt)*);
        $crate::debug::drain();
    });
}

#[cfg(target_os = "none")]
#[panic_handler]
fn ph(info: &core::panic::PanicInfo) -> ! {
    sdbgln!("{info}");
    loop {
        unsafe {(*cortex_m::peripheral::SCB::PTR).aircr.write(0x05fa0004)};
    }
}

impl Config {
    pub const fn debug(&mut self) -> &mut Self {
        self.baud = 115200;
        self.clocks(cpu::AHB_IOPA, cpu::APB1_USART2, 0)
    }
}

#[test]
fn baud_divider() {
    assert_eq!(brr(48_000_000, 115200), 417);
    assert_eq!(brr(8_000_000, 115200), 69);
    assert_eq!(crate::CONFIG.baud, 115200);
}

#[test]
fn silent_before_init() {
    // Must not touch the (absent) UART.
    dbgln!("value {}", 42);
    sdbgln!();
    assert!(!ENABLED.read());
}
