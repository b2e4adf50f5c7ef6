//! Polled I²C master on the STM32F0 I2C v2 block.
//!
//! Every transaction walks the same steps: wait for the bus to go idle,
//! program CR2 (address, direction, NBYTES) and START, move the bytes on
//! TXIS / RXNE, wait for TC, STOP, then wait for and clear STOPF.  Each wait is
//! bounded by the spin limit, and a failed wait aborts the transaction so
//! that the peripheral can be reused or `reset`.

use embedded_hal::i2c::{self as hal, ErrorKind, NoAcknowledgeSource, Operation};
use stm32f0::stm32f0x1::{I2C1, RCC, i2c1};

use crate::cpu::{self, Config};

macro_rules!dbgln {($($tt:tt)*) => {if false {crate::dbgln!($($tt)*)}};}

pub const ISR_TXIS : u32 = 1 << 1;
pub const ISR_RXNE : u32 = 1 << 2;
pub const ISR_NACKF: u32 = 1 << 4;
pub const ISR_STOPF: u32 = 1 << 5;
pub const ISR_TC   : u32 = 1 << 6;
pub const ISR_TCR  : u32 = 1 << 7;
pub const ISR_BERR : u32 = 1 << 8;
pub const ISR_ARLO : u32 = 1 << 9;
pub const ISR_OVR  : u32 = 1 << 10;
pub const ISR_BUSY : u32 = 1 << 15;
const ISR_ERRORS: u32 = ISR_NACKF | ISR_BERR | ISR_ARLO | ISR_OVR;

// ICR bits sit at the same positions as the ISR flags they clear.
pub const ICR_STOPCF: u32 = ISR_STOPF;
pub const ICR_ALL   : u32 = 0x3f38;

/// Largest NBYTES value.
pub const MAX_CHUNK: usize = 255;

/// TIMINGR fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub presc: u8,
    pub scldel: u8,
    pub sdadel: u8,
    pub sclh: u8,
    pub scll: u8,
}

impl Timing {
    pub const RESET: Timing =
        Timing {presc: 0, scldel: 0, sdadel: 0, sclh: 0, scll: 0};
    /// 100kHz from the 8MHz HSI kernel clock.
    pub const STANDARD_8MHZ: Timing =
        Timing {presc: 1, scldel: 8, sdadel: 0, sclh: 0x5e, scll: 0x89};
}

/// One CR2 programme: the slave, the direction and the byte count of the
/// next chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub addr: u8,
    pub nbytes: u8,
    pub read: bool,
    /// More chunks follow; pause at TCR instead of TC.
    pub reload: bool,
    /// Hardware STOP once NBYTES are done.
    pub autoend: bool,
}

/// Access to an I²C peripheral.  The driver only ever talks to the hardware
/// through this.
pub trait Regs {
    /// ISR, see the `ISR_` masks.
    fn isr(&self) -> u32;
    /// Write ICR.
    fn clear(&self, flags: u32);
    fn enable(&self, on: bool);
    fn enabled(&self) -> bool;
    /// Only takes effect with PE clear.
    fn set_timing(&self, timing: Timing);
    /// Program CR2.  With `start` this generates a (repeated) START,
    /// without it the transfer carries on from a TCR pause.
    fn program(&self, xfer: Transfer, start: bool);
    fn stop(&self);
    fn txdr(&self, byte: u8);
    fn rxdr(&self) -> u8;
}

impl Regs for i2c1::RegisterBlock {
    fn isr(&self) -> u32 {self.isr.read().bits()}
    fn clear(&self, flags: u32) {self.icr.write(|w| unsafe {w.bits(flags)})}
    fn enable(&self, on: bool) {self.cr1.modify(|_, w| w.pe().bit(on))}
    fn enabled(&self) -> bool {self.cr1.read().pe().bit_is_set()}
    #[allow(unused_unsafe)]
    fn set_timing(&self, t: Timing) {
        self.timingr.write(|w| unsafe {
            w.presc().bits(t.presc).scldel().bits(t.scldel)
                .sdadel().bits(t.sdadel).sclh().bits(t.sclh)
                .scll().bits(t.scll)});
    }
    #[allow(unused_unsafe)]
    fn program(&self, x: Transfer, start: bool) {
        self.cr2.write(|w| unsafe {
            w.sadd().bits((x.addr as u16) << 1).nbytes().bits(x.nbytes)}
            .rd_wrn().bit(x.read).reload().bit(x.reload)
            .autoend().bit(x.autoend).start().bit(start));
    }
    fn stop(&self) {self.cr2.modify(|_, w| w.stop().set_bit())}
    fn txdr(&self, byte: u8) {self.txdr.write(|w| unsafe {w.bits(byte as u32)})}
    fn rxdr(&self) -> u8 {self.rxdr.read().bits() as u8}
}

/// The wait that ran out of spins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Transmit,
    Receive,
    Complete,
    Reload,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// BUSY never dropped, nothing was sent.
    BusBusy,
    /// Address or data byte not acknowledged.
    Nack,
    Arbitration,
    Bus,
    Overrun,
    Timeout(Step),
    /// Above 0x7f.
    Address,
    /// More bytes than one NBYTES programme can carry.
    Length,
}

impl hal::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::Arbitration => ErrorKind::ArbitrationLoss,
            Error::Bus => ErrorKind::Bus,
            Error::Overrun => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T = ()> = core::result::Result<T, Error>;

/// A single chunk transfer, no RELOAD, no AUTOEND.
const fn transfer(addr: u8, len: usize, read: bool) -> Transfer {
    Transfer {addr, nbytes: len as u8, read, reload: false, autoend: false}
}

fn check_address(addr: u8) -> Result {
    if addr > 0x7f {Err(Error::Address)} else {Ok(())}
}

/// Exclusive owner of one I²C peripheral.
pub struct I2c<'a, R: Regs = i2c1::RegisterBlock> {
    regs: &'a R,
    /// Polls of ISR per wait before giving up.
    spin: u32,
}

/// Pulse the peripheral reset and bring I2C1 up with the configured timing.
/// Pins and the peripheral clock are the caller's business.
pub fn init(config: &Config) -> I2c<'static> {
    let rcc = unsafe {&*RCC::ptr()};
    rcc.apb1rstr.modify(|_, w| w.i2c1rst().set_bit());
    rcc.apb1rstr.modify(|_, w| w.i2c1rst().clear_bit());

    let mut bus = I2c::new(unsafe {&*I2C1::ptr()}, config.i2c_spin);
    bus.enable(config.i2c_timing);
    bus
}

impl<'a, R: Regs> I2c<'a, R> {
    pub fn new(regs: &'a R, spin: u32) -> Self {
        I2c {regs, spin}
    }

    /// Program TIMINGR (only legal with PE clear) and enable.
    pub fn enable(&mut self, timing: Timing) {
        self.regs.enable(false);
        self.regs.set_timing(timing);
        self.regs.enable(true);
    }

    /// Software reset.  Clears the state machine and all flags, leaving the
    /// timing alone.
    pub fn reset(&mut self) {
        self.restart();
    }

    #[allow(dead_code)]
    pub fn write_byte(&mut self, addr: u8, byte: u8) -> Result {
        self.write_bytes(addr, &[byte])
    }

    pub fn write_bytes(&mut self, addr: u8, bytes: &[u8]) -> Result {
        check_address(addr)?;
        if bytes.len() > MAX_CHUNK {
            return Err(Error::Length);
        }
        self.wait_idle()?;
        self.run(|s| {
            s.start(transfer(addr, bytes.len(), false));
            for &b in bytes {
                s.send(b)?;
            }
            s.complete()?;
            s.stop()
        })
    }

    /// Write the register pointer then read `buf.len()` bytes from it, with a
    /// repeated start in between.
    #[allow(dead_code)]
    pub fn read_bytes(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result {
        check_address(addr)?;
        if buf.len() > MAX_CHUNK {
            return Err(Error::Length);
        }
        self.wait_idle()?;
        self.run(|s| {
            s.start(transfer(addr, 1, false));
            s.send(reg)?;
            s.complete()?;
            s.start(Transfer {autoend: true, ..transfer(addr, buf.len(), true)});
            for b in buf.iter_mut() {
                *b = s.recv()?;
            }
            s.finish()
        })
    }

    /// Address-only write.  `Err(Error::Nack)` means nobody is there.
    pub fn probe(&mut self, addr: u8) -> Result {
        self.write_bytes(addr, &[])
    }

    /// Whatever goes wrong once the bus is ours ends in `abort`.
    fn run(&self, f: impl FnOnce(&Self) -> Result) -> Result {
        let result = f(self);
        if let Err(e) = result {
            dbgln!("I2C {e:?} ISR {:#x}", self.regs.isr());
            self.abort();
        }
        result
    }

    fn wait_idle(&self) -> Result {
        if self.released() {Ok(())} else {Err(Error::BusBusy)}
    }

    /// Spin for `flag`, bailing out on any error flag.
    fn wait(&self, flag: u32, step: Step) -> Result {
        for _ in 0..self.spin {
            let status = self.regs.isr();
            if status & ISR_ERRORS != 0 {
                return Err(fault(status));
            }
            if status & flag != 0 {
                return Ok(());
            }
        }
        Err(Error::Timeout(step))
    }

    /// Get the bus released and ISR clean.  A NACK comes with its own STOP;
    /// otherwise ask for one, and if even that does not free the bus, reset
    /// the peripheral.
    fn abort(&self) {
        if !self.released() {
            self.regs.stop();
            if !self.released() {
                dbgln!("I2C stuck, resetting");
                self.restart();
            }
        }
        self.regs.clear(ICR_ALL);
    }

    /// Spin until BUSY drops.
    fn released(&self) -> bool {
        (0..self.spin).any(|_| self.regs.isr() & ISR_BUSY == 0)
    }

    fn restart(&self) {
        self.regs.enable(false);
        // PE has to read back as clear, and stay so for three APB clocks.
        for _ in 0..3 {
            let _ = self.regs.enabled();
        }
        self.regs.enable(true);
    }

    fn start(&self, xfer: Transfer) {
        self.regs.program(xfer, true);
    }

    fn send(&self, byte: u8) -> Result {
        self.wait(ISR_TXIS, Step::Transmit)?;
        self.regs.txdr(byte);
        Ok(())
    }

    fn recv(&self) -> Result<u8> {
        self.wait(ISR_RXNE, Step::Receive)?;
        Ok(self.regs.rxdr())
    }

    fn complete(&self) -> Result {
        self.wait(ISR_TC, Step::Complete)
    }

    fn stop(&self) -> Result {
        self.regs.stop();
        self.finish()
    }

    fn finish(&self) -> Result {
        self.wait(ISR_STOPF, Step::Stop)?;
        self.regs.clear(ICR_STOPCF);
        Ok(())
    }

    /// Move `len` bytes in the one direction, NBYTES at a time.  The first
    /// chunk gets a (repeated) START, the rest continue via RELOAD.
    fn chunked(&self, addr: u8, read: bool, len: usize,
               mut byte: impl FnMut() -> Result) -> Result {
        let mut done = 0;
        loop {
            let n = (len - done).min(MAX_CHUNK);
            let xfer = Transfer {reload: done + n < len, ..transfer(addr, n, read)};
            if done == 0 {
                self.start(xfer);
            }
            else {
                self.wait(ISR_TCR, Step::Reload)?;
                self.regs.program(xfer, false);
            }
            for _ in 0..n {
                byte()?;
            }
            done += n;
            if done >= len {
                return Ok(());
            }
        }
    }

    /// Adjacent operations in the same direction run as one stream with no
    /// restart between them.
    fn operations(&self, addr: u8, ops: &mut [Operation<'_>]) -> Result {
        let mut rest = ops;
        let mut first = true;
        while let Some(head) = rest.first() {
            let read = is_read(head);
            let n = rest.iter().take_while(|op| is_read(op) == read).count();
            let (run, tail) = core::mem::take(&mut rest).split_at_mut(n);
            rest = tail;

            if !first {
                self.complete()?;
            }
            first = false;

            if read {
                let len: usize = run.iter().map(op_len).sum();
                let mut dst = run.iter_mut().flat_map(|op| match op {
                    Operation::Read(buf) => buf.iter_mut(),
                    Operation::Write(_) => Default::default(),
                });
                self.chunked(addr, true, len, || {
                    let b = self.recv()?;
                    if let Some(d) = dst.next() {
                        *d = b;
                    }
                    Ok(())
                })?;
            }
            else {
                let len: usize = run.iter().map(op_len).sum();
                let mut src = run.iter().flat_map(|op| match op {
                    Operation::Write(bytes) => bytes.iter(),
                    Operation::Read(_) => Default::default(),
                });
                self.chunked(addr, false, len,
                             || self.send(src.next().copied().unwrap_or(0)))?;
            }
        }
        self.complete()?;
        self.stop()
    }
}

/// Decode the error flags of `status`.
fn fault(status: u32) -> Error {
    if status & ISR_ARLO != 0 {Error::Arbitration}
    else if status & ISR_BERR != 0 {Error::Bus}
    else if status & ISR_OVR != 0 {Error::Overrun}
    else {Error::Nack}
}

fn is_read(op: &Operation<'_>) -> bool {
    matches!(op, Operation::Read(_))
}

fn op_len(op: &Operation<'_>) -> usize {
    match op {
        Operation::Read(buf) => buf.len(),
        Operation::Write(bytes) => bytes.len(),
    }
}

impl<R: Regs> hal::ErrorType for I2c<'_, R> {
    type Error = Error;
}

impl<R: Regs> hal::I2c for I2c<'_, R> {
    fn transaction(&mut self, address: u8,
                   operations: &mut [Operation<'_>]) -> Result {
        check_address(address)?;
        if operations.is_empty() {
            return Ok(());
        }
        self.wait_idle()?;
        self.run(|s| s.operations(address, operations))
    }
}

impl Config {
    pub const fn i2c(&mut self) -> &mut Self {
        // 100kHz.  The I2C1 kernel clock stays on the 8MHz HSI whatever the
        // system clock.
        self.i2c_timing = Timing::STANDARD_8MHZ;
        self.i2c_spin = 100_000;
        self.clocks(cpu::AHB_IOPB, cpu::APB1_I2C1, 0)
    }
}

#[cfg(test)]
use crate::sim::{SimI2c, Event};

#[cfg(test)]
const SPIN: u32 = 1000;

#[cfg(test)]
fn stops(sim: &SimI2c) -> usize {
    sim.log().iter().filter(|e| **e == Event::Stop).count()
}

#[test]
fn display_off_command() {
    let sim = SimI2c::with_devices(&[0x3c]);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_byte(0x3c, 0xae), Ok(()));
    assert_eq!(sim.log(), [
        Event::Start {addr: 0x3c, read: false, nbytes: 1, reload: false,
                      autoend: false},
        Event::Tx(0xae),
        Event::Stop]);
    assert_eq!(sim.programmed(), Some(transfer(0x3c, 1, false)));
    assert!(!sim.busy());
    assert_eq!(sim.isr() & ISR_STOPF, 0);
}

#[test]
fn write_order_and_single_stop() {
    for addr in 0 ..= 0x7f {
        let count = addr as usize * 2 % 256;
        let data: Vec<u8> = (0..count).map(|i| (i * 7 + addr as usize) as u8)
            .collect();
        let sim = SimI2c::with_devices(&[addr]);
        let mut bus = I2c::new(&sim, SPIN);
        assert_eq!(bus.write_bytes(addr, &data), Ok(()));
        assert_eq!(sim.transmitted(), data);
        assert_eq!(stops(&sim), 1);
        assert_eq!(sim.log().last(), Some(&Event::Stop));
    }
}

#[test]
fn max_length_write() {
    let sim = SimI2c::with_devices(&[0x50]);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_bytes(0x50, &[0x55; 255]), Ok(()));
    assert_eq!(sim.transmitted().len(), 255);
    assert_eq!(bus.write_bytes(0x50, &[0x55; 256]), Err(Error::Length));
    assert_eq!(sim.transmitted().len(), 255);
}

#[test]
fn register_read() {
    let sim = SimI2c::with_devices(&[0x68]);
    sim.queue_rx(&[0x11, 0x22, 0x33, 0x44]);
    let mut bus = I2c::new(&sim, SPIN);
    let mut buf = [0u8; 4];
    assert_eq!(bus.read_bytes(0x68, 0x3b, &mut buf), Ok(()));
    assert_eq!(buf, [0x11, 0x22, 0x33, 0x44]);
    assert_eq!(sim.log(), [
        Event::Start {addr: 0x68, read: false, nbytes: 1, reload: false,
                      autoend: false},
        Event::Tx(0x3b),
        Event::Start {addr: 0x68, read: true, nbytes: 4, reload: false,
                      autoend: true},
        Event::Rx(0x11), Event::Rx(0x22), Event::Rx(0x33), Event::Rx(0x44),
        Event::Stop]);
    assert!(!sim.busy());
}

#[test]
fn read_lengths() {
    for n in 0 ..= MAX_CHUNK {
        let data: Vec<u8> = (0..n).map(|i| (i * 13 + 5) as u8).collect();
        let sim = SimI2c::with_devices(&[0x50]);
        sim.queue_rx(&data);
        let mut bus = I2c::new(&sim, SPIN);
        let mut buf = vec![0u8; n];
        assert_eq!(bus.read_bytes(0x50, 0x10, &mut buf), Ok(()));
        assert_eq!(buf, data);
        let log = sim.log();
        let rx = log.iter().filter(|e| matches!(e, Event::Rx(_))).count();
        assert_eq!(rx, n);
        assert_eq!(sim.transmitted(), [0x10]);
        assert_eq!(stops(&sim), 1);
        assert_eq!(log.last(), Some(&Event::Stop));
    }
    let sim = SimI2c::with_devices(&[0x50]);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.read_bytes(0x50, 0, &mut [0; 256]), Err(Error::Length));
    assert!(sim.log().is_empty());
}

#[test]
fn silent_read_times_out() {
    let sim = SimI2c::with_devices(&[0x68]);
    sim.mute_reads(true);
    let mut bus = I2c::new(&sim, SPIN);
    let mut buf = [0u8; 2];
    assert_eq!(bus.read_bytes(0x68, 0x3b, &mut buf),
               Err(Error::Timeout(Step::Receive)));
    // The register select went out, then the read was abandoned with a STOP.
    assert_eq!(sim.transmitted(), [0x3b]);
    assert_eq!(sim.log().last(), Some(&Event::Stop));
    assert!(!sim.busy());
    assert_eq!(sim.isr() & ICR_ALL, 0);
    sim.mute_reads(false);
    sim.queue_rx(&[1, 2]);
    assert_eq!(bus.read_bytes(0x68, 0x3b, &mut buf), Ok(()));
    assert_eq!(buf, [1, 2]);
}

#[test]
fn absent_device() {
    let sim = SimI2c::with_devices(&[]);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_byte(0x3c, 0xae), Err(Error::Nack));
    assert_eq!(bus.probe(0x3c), Err(Error::Nack));
    assert!(sim.transmitted().is_empty());
    assert!(!sim.busy());
    assert_eq!(sim.isr() & (ISR_NACKF | ISR_STOPF), 0);
}

#[test]
fn data_nack() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.nack_after(1);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_bytes(0x3c, &[1, 2, 3]), Err(Error::Nack));
    assert_eq!(sim.transmitted(), [1, 2]);
    assert!(!sim.busy());
}

#[test]
fn stuck_bus() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.hold_busy(true);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_byte(0x3c, 0), Err(Error::BusBusy));
    assert!(sim.log().is_empty());
    sim.hold_busy(false);
    assert_eq!(bus.write_byte(0x3c, 0), Ok(()));
}

#[test]
fn silent_device_times_out() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.mute(true);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_bytes(0x3c, &[1, 2]),
               Err(Error::Timeout(Step::Transmit)));
    // Aborted: the bus was released and is usable again.
    assert_eq!(sim.log().last(), Some(&Event::Stop));
    assert!(!sim.busy());
    sim.mute(false);
    assert_eq!(bus.write_bytes(0x3c, &[1, 2]), Ok(()));
    assert_eq!(sim.transmitted(), [1, 2]);
}

#[test]
fn bus_error_mid_write() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.bus_error_after(2);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_bytes(0x3c, &[1, 2, 3, 4]), Err(Error::Bus));
    // The error left the bus held; abort asked for the STOP.
    assert_eq!(sim.transmitted(), [1, 2, 3]);
    assert_eq!(sim.log().last(), Some(&Event::Stop));
    assert!(!sim.busy());
    assert_eq!(sim.isr() & ICR_ALL, 0);
    assert_eq!(bus.write_bytes(0x3c, &[5]), Ok(()));
}

#[test]
fn overrun_mid_read() {
    let sim = SimI2c::with_devices(&[0x68]);
    sim.queue_rx(&[1, 2, 3]);
    sim.overrun_after(1);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.read_bytes(0x68, 0, &mut [0; 3]), Err(Error::Overrun));
    assert_eq!(sim.log().last(), Some(&Event::Stop));
    assert!(!sim.busy());
}

#[test]
fn wedged_bus_resets_peripheral() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.mute(true);
    sim.ignore_stop(true);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_bytes(0x3c, &[1]), Err(Error::Timeout(Step::Transmit)));
    // STOP went unheeded, so PE was toggled.
    let log = sim.log();
    assert_eq!(log[log.len() - 2 ..], [Event::Enable(false), Event::Enable(true)]);
    assert!(!sim.busy());
}

#[test]
fn arbitration_loss() {
    let sim = SimI2c::with_devices(&[0x3c]);
    sim.lose_arbitration(true);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_byte(0x3c, 1), Err(Error::Arbitration));
    assert_eq!(sim.isr() & ICR_ALL, 0);
}

#[test]
fn bad_address() {
    let sim = SimI2c::with_devices(&[]);
    let mut bus = I2c::new(&sim, SPIN);
    assert_eq!(bus.write_byte(0x80, 0), Err(Error::Address));
    assert_eq!(bus.read_bytes(0xff, 0, &mut [0]), Err(Error::Address));
    assert!(sim.log().is_empty());
}

#[test]
fn enable_and_reset() {
    let sim = SimI2c::with_devices(&[]);
    let mut bus = I2c::new(&sim, SPIN);
    bus.enable(Timing::STANDARD_8MHZ);
    assert_eq!(sim.timing(), Timing::STANDARD_8MHZ);
    assert!(sim.enabled());
    bus.reset();
    assert!(sim.enabled());
    assert_eq!(sim.log(), [Event::Enable(false), Event::Enable(true),
                           Event::Enable(false), Event::Enable(true)]);
    assert_eq!(crate::CONFIG.i2c_timing, Timing::STANDARD_8MHZ);
}

#[test]
fn hal_write_read_merges_writes() {
    use embedded_hal::i2c::I2c as _;
    let sim = SimI2c::with_devices(&[0x48]);
    sim.queue_rx(&[0xbe, 0xef]);
    let mut bus = I2c::new(&sim, SPIN);
    let mut buf = [0u8; 2];
    let mut ops = [Operation::Write(&[1]), Operation::Write(&[2, 3]),
                   Operation::Read(&mut buf)];
    assert_eq!(bus.transaction(0x48, &mut ops), Ok(()));
    assert_eq!(buf, [0xbe, 0xef]);
    assert_eq!(sim.log(), [
        Event::Start {addr: 0x48, read: false, nbytes: 3, reload: false,
                      autoend: false},
        Event::Tx(1), Event::Tx(2), Event::Tx(3),
        Event::Start {addr: 0x48, read: true, nbytes: 2, reload: false,
                      autoend: false},
        Event::Rx(0xbe), Event::Rx(0xef),
        Event::Stop]);
}

#[test]
fn hal_long_write_reloads() {
    use embedded_hal::i2c::I2c as _;
    let sim = SimI2c::with_devices(&[0x3c]);
    let mut bus = I2c::new(&sim, SPIN);
    let data: Vec<u8> = (0..300).map(|i| i as u8).collect();
    assert_eq!(bus.write(0x3c, &data), Ok(()));
    assert_eq!(sim.transmitted(), data);
    let log = sim.log();
    assert_eq!(log[0], Event::Start {addr: 0x3c, read: false, nbytes: 255,
                                     reload: true, autoend: false});
    assert_eq!(log[256], Event::Reload {nbytes: 45, reload: false});
    assert_eq!(stops(&sim), 1);
}

#[test]
fn hal_error_kinds() {
    use embedded_hal::i2c::Error as _;
    assert_eq!(Error::Nack.kind(),
               ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown));
    assert_eq!(Error::Arbitration.kind(), ErrorKind::ArbitrationLoss);
    assert_eq!(Error::Timeout(Step::Stop).kind(), ErrorKind::Other);
}
