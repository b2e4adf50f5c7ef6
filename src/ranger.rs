#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(warnings)]

mod cpu;
mod debug;
mod gpio;
mod i2c;
mod timer;
mod ultrasonic;
mod vcell;

#[cfg(test)]
mod sim;

const CONFIG: cpu::Config =
    *cpu::Config::new(48_000_000).debug().i2c().timer().ranger();

/// Display controller, only checked for presence.
const DISPLAY: u8 = 0x3c;

#[used]
#[unsafe(link_section = ".vectors")]
pub static VECTORS: cpu::VectorTable = cpu::VectorTable::new();

pub fn main() -> ! {
    cpu::init(&CONFIG);
    debug::init(&CONFIG);
    dbgln!("Ranger {}MHz", CONFIG.clk / 1_000_000);

    let mut clock = timer::Clock::hw(&CONFIG);
    clock.init();

    gpio::i2c_pins();
    let mut bus = i2c::init(&CONFIG);
    let t0 = clock.now();
    match bus.probe(DISPLAY) {
        Ok(()) => dbgln!("Display at {DISPLAY:#04x}"),
        Err(e) => {
            dbgln!("No display: {e:?}");
            bus.reset();
        }
    }
    dbgln!("Probe took {}us", clock.elapsed(t0));

    let (trig, echo) = gpio::ranger_pins();
    let mut ranger = ultrasonic::Ranger::new(
        trig, echo, clock, CONFIG.settle_ms);

    loop {
        ranger.measure(CONFIG.echo_timeout);
        let m = ranger.last();
        match m.distance() {
            Some(cm) => dbgln!("{cm} cm ({} us)", m.duration),
            None => dbgln!("No echo: {:?}", m.fault),
        }
    }
}
