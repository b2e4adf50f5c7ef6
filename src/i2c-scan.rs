#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(warnings)]

mod cpu;
mod debug;
// The rangefinder pins are not wired up here.
#[allow(dead_code)]
mod gpio;
mod i2c;
mod timer;
mod vcell;

#[cfg(test)]
#[allow(dead_code)]
mod sim;

use arrayvec::ArrayVec;

const CONFIG: cpu::Config = *cpu::Config::new(48_000_000).debug().i2c().timer();

const FIRST: u8 = 0x08;
const LAST : u8 = 0x77;
const SLOTS: usize = (LAST - FIRST + 1) as usize;
static_assertions::const_assert_eq!(SLOTS, 112);

const SCAN_PERIOD_MS: u32 = 5000;

#[used]
#[unsafe(link_section = ".vectors")]
pub static VECTORS: cpu::VectorTable = cpu::VectorTable::new();

/// Probe every non-reserved address.  A NACK means nobody home; anything
/// else is logged and the peripheral reset before carrying on.
fn scan<R: i2c::Regs>(bus: &mut i2c::I2c<R>) -> ArrayVec<u8, SLOTS> {
    let mut found = ArrayVec::new();
    for addr in FIRST ..= LAST {
        match bus.probe(addr) {
            Ok(()) => found.push(addr),
            Err(i2c::Error::Nack) => (),
            Err(e) => {
                dbgln!("{addr:#04x}: {e:?}");
                bus.reset();
            }
        }
    }
    found
}

pub fn main() -> ! {
    cpu::init(&CONFIG);
    debug::init(&CONFIG);
    gpio::i2c_pins();
    let mut bus = i2c::init(&CONFIG);
    let mut clock = timer::Clock::hw(&CONFIG);
    clock.init();

    loop {
        let t0 = clock.now();
        let found = scan(&mut bus);
        dbgln!("{} device(s) in {}us", found.len(), clock.elapsed(t0));
        for addr in found {
            dbgln!("  {addr:#04x}");
        }
        clock.delay_ms(SCAN_PERIOD_MS);
    }
}

#[test]
fn scan_finds_devices() {
    use sim::{Event, SimI2c};
    let sim = SimI2c::with_devices(&[0x03, 0x3c, 0x68, 0x77, 0x78]);
    let mut bus = i2c::I2c::new(&sim, 1000);
    let found = scan(&mut bus);
    assert_eq!(found.as_slice(), [0x3c, 0x68, 0x77]);
    let starts = sim.log().iter()
        .filter(|e| matches!(e, Event::Start {..})).count();
    assert_eq!(starts, 0x70);
}

#[test]
fn scan_survives_a_stuck_device() {
    use sim::SimI2c;
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.lose_arbitration(true);
    let mut bus = i2c::I2c::new(&sim, 1000);
    assert!(scan(&mut bus).is_empty());
    sim.lose_arbitration(false);
    assert_eq!(scan(&mut bus).as_slice(), [0x3c]);
}
