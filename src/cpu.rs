use core::mem::offset_of;

use stm32f0::stm32f0x1::{FLASH, RCC};

use crate::i2c::Timing;

pub const AHB_IOPA   : u32 = 1 << 17;
pub const AHB_IOPB   : u32 = 1 << 18;
pub const APB1_TIM2  : u32 = 1;
pub const APB1_USART2: u32 = 1 << 17;
pub const APB1_I2C1  : u32 = 1 << 21;
pub const APB2_TIM1  : u32 = 1 << 11;

const SW_HSI48: u8 = 3;

/// Board configuration, assembled at compile time by each subsystem's
/// builder method.
#[derive(Clone, Copy)]
pub struct Config {
    /// System clock in Hz.  8MHz HSI out of reset, or 48MHz HSI48.
    pub clk: u32,
    pub ahb_clocks: u32,
    pub apb1_clocks: u32,
    pub apb2_clocks: u32,
    pub baud: u32,
    pub i2c_timing: Timing,
    /// ISR polls per I²C wait.
    pub i2c_spin: u32,
    /// Echo phase limit, in microsecond ticks.
    #[allow(dead_code)]
    pub echo_timeout: u32,
    /// Pause after each measurement so old echoes die away.
    #[allow(dead_code)]
    pub settle_ms: u32,
}

impl Config {
    pub const fn new(clk: u32) -> Config {
        assert!(clk == 8_000_000 || clk == 48_000_000, "clk not implemented");
        Config {
            clk, ahb_clocks: 0, apb1_clocks: 0, apb2_clocks: 0,
            baud: 0, i2c_timing: Timing::RESET, i2c_spin: 0, echo_timeout: 0,
            settle_ms: 0,
        }
    }
    pub const fn clocks(&mut self, ahb: u32, apb1: u32, apb2: u32)
                        -> &mut Self {
        self.ahb_clocks  |= ahb;
        self.apb1_clocks |= apb1;
        self.apb2_clocks |= apb2;
        self
    }
}

#[cfg(target_os = "none")]
unsafe extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
}

#[allow(unused_unsafe)]
pub fn init(config: &Config) {
    let rcc = unsafe {&*RCC::ptr()};
    let flash = unsafe {&*FLASH::ptr()};

    if config.clk == 48_000_000 {
        // One wait state above 24MHz.
        flash.acr.write(|w| unsafe {w.latency().bits(1)}.prftbe().set_bit());
        rcc.cr2.modify(|_, w| w.hsi48on().set_bit());
        while rcc.cr2.read().hsi48rdy().bit_is_clear() {
        }
        rcc.cfgr.modify(|_, w| unsafe {w.sw().bits(SW_HSI48)});
        while rcc.cfgr.read().sws().bits() != SW_HSI48 {
        }
    }

    #[cfg(target_os = "none")]
    {
        let bss_start = &raw mut __bss_start;
        let bss_end   = &raw mut __bss_end;
        let bss_size = bss_end.addr() - bss_start.addr();
        unsafe {
            core::ptr::write_bytes(bss_start, 0u8, bss_size);
        }
    }

    rcc.ahbenr .modify(|r, w| unsafe {w.bits(r.bits() | config.ahb_clocks)});
    rcc.apb1enr.modify(|r, w| unsafe {w.bits(r.bits() | config.apb1_clocks)});
    rcc.apb2enr.modify(|r, w| unsafe {w.bits(r.bits() | config.apb2_clocks)});
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct VectorTable {
    pub stack     : u32,
    pub reset     : fn() -> !,
    pub nmi       : fn(),
    pub hard_fault: fn(),
    pub reserved1 : [usize; 7],
    pub svcall    : fn(),
    pub reserved2 : [usize; 2],
    pub pendsv    : fn(),
    pub systick   : fn(),
    pub isr       : [fn(); 32],
}

// Slots are words on the target and pointer sized on a host test build.
const SLOT: usize = size_of::<usize>();
static_assertions::const_assert_eq!(offset_of!(VectorTable, svcall), 11 * SLOT);
static_assertions::const_assert_eq!(offset_of!(VectorTable, isr), 16 * SLOT);

impl VectorTable {
    pub const fn new() -> VectorTable {
        VectorTable{
            stack     : 0x20000000 + 32 * 1024,
            reset     : super::main,
            nmi       : bugger,
            hard_fault: bugger,
            reserved1 : [0; 7],
            svcall    : bugger,
            reserved2 : [0; 2],
            pendsv    : bugger,
            systick   : bugger,
            isr       : [bugger; 32]}
    }
}

fn bugger() {
    panic!("Unexpected interrupt");
}

#[test]
fn check_vectors() {
    assert!(core::ptr::fn_addr_eq(crate::VECTORS.reset,
                                  crate::main as fn() -> !));
    assert_eq!(crate::VECTORS.stack, 0x20008000);
}

#[test]
fn vector_layout() {
    assert_eq!(offset_of!(VectorTable, reset), SLOT);
    assert_eq!(offset_of!(VectorTable, pendsv), 14 * SLOT);
    assert_eq!(size_of::<VectorTable>(), 48 * SLOT);
}

#[test]
fn check_clocks() {
    assert_eq!(crate::CONFIG.clk, 48_000_000);
    assert_ne!(crate::CONFIG.ahb_clocks & AHB_IOPB, 0);
    assert_ne!(crate::CONFIG.apb1_clocks & APB1_I2C1, 0);
    assert_ne!(crate::CONFIG.apb1_clocks & APB1_USART2, 0);
}

#[test]
fn builder_accumulates() {
    // The builder only ever adds clocks.
    let c = *Config::new(8_000_000).clocks(AHB_IOPA, 0, 0)
        .clocks(AHB_IOPB, APB1_I2C1, APB2_TIM1);
    assert_eq!(c.ahb_clocks, AHB_IOPA | AHB_IOPB);
    assert_eq!(c.apb1_clocks, APB1_I2C1);
    assert_eq!(c.apb2_clocks, APB2_TIM1);
    assert_eq!(c.i2c_spin, 0);
}
