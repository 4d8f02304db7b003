//! Pin state, bit encoder, and FIFO flow controller (components A, B, C).
//!
//! This is the layer everything else in the crate is built on: it owns the
//! live output byte, the TX batch / RX ring of `spec.md` §4.B, and the
//! "never let more than `FIFO_MIN` bytes sit unacknowledged in the device"
//! invariant of §4.C — the single most important correctness property of
//! the whole driver.

use std::time::Duration;

use crate::error::Result;
use crate::pins::{LogicalPin, PinMap};
use crate::transport::{BitMode, FtdiTransport};
use crate::txrx::{RxRing, TxBatch, FIFO_MIN};

pub struct Io<T: FtdiTransport> {
    transport: T,
    pins: PinMap,
    ddr: u8,
    out: u8,
    tx: TxBatch,
    rx: RxRing,
    /// Bytes written to the device whose echo hasn't been read back yet.
    pending: usize,
    /// Leading RX bytes the caller wants silently dropped (writes made with
    /// `send_and_discard`, e.g. plain pin twiddling with no logical echo).
    discard: usize,
    /// Repeat count per output byte; >1 only under
    /// `PulseWidthMode::Fixed3MhzRepeat` (`spec.md` §4.H).
    baud_multiplier: u32,
}

impl<T: FtdiTransport> Io<T> {
    pub fn new(transport: T, pins: PinMap, baud_multiplier: u32) -> Self {
        let ddr = pins.data_direction();
        Io {
            transport,
            pins,
            ddr,
            out: 0,
            tx: TxBatch::new(),
            rx: RxRing::new(),
            pending: 0,
            discard: 0,
            baud_multiplier: baud_multiplier.max(1),
        }
    }

    pub fn pins(&self) -> &PinMap { &self.pins }

    pub fn ddr(&self) -> u8 { self.ddr }

    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    pub fn transport(&self) -> &T { &self.transport }

    /// Fill the RX ring with everything still owed by the device from a
    /// previous fragment, and reset bookkeeping. Used on open/program-enable
    /// retries (`ft245r_drain`; the unused `display` parameter from the
    /// original is dropped per `spec.md` §9).
    pub fn drain(&mut self) -> Result<()> {
        self.transport.set_bitmode(0, BitMode::Reset)?;
        self.transport.set_bitmode(self.ddr, BitMode::SyncBitBang)?;
        self.rx.purge();
        self.pending = 0;
        self.discard = 0;
        self.tx.clear();
        Ok(())
    }

    /// Read one chunk from the device sized by however many bytes are
    /// currently `pending`, and push them into the RX ring. Returns the
    /// number of bytes actually read.
    fn fill(&mut self) -> Result<usize> {
        let mut raw = [0u8; FIFO_MIN];
        let want = self.pending.min(FIFO_MIN);
        let nread = self.transport.read_data(&mut raw[..want])?;
        self.pending -= nread;
        for &byte in &raw[..nread] {
            self.rx.put(byte);
        }
        log::trace!("fill: read {nread} bytes (pending={})", self.pending);
        Ok(nread)
    }

    /// Block until at least one byte is available in the RX ring, then pop
    /// it.
    fn rx_buf_fill_and_get(&mut self) -> Result<u8> {
        while self.rx.is_empty() {
            self.fill()?;
        }
        Ok(self.rx.get().expect("just checked non-empty"))
    }

    /// Walk the TX batch out to the device in slices sized by current
    /// headroom (`FIFO_MIN - pending`), reading to make room whenever
    /// there isn't any (`spec.md` §4.C — the core non-trivial invariant).
    fn flush(&mut self) -> Result<()> {
        let mut remaining = self.tx.len();
        if remaining == 0 {
            return Ok(());
        }
        let mut src_offset = 0usize;
        while remaining > 0 {
            let mut avail = FIFO_MIN.saturating_sub(self.pending);
            if avail == 0 {
                avail = self.fill()?;
            }
            avail = avail.min(remaining);
            let chunk = &self.tx.as_slice()[src_offset..src_offset + avail];
            let written = self.transport.write_data(chunk)?;
            if written != avail {
                return Err(crate::error::Ft245rError::transport(format!(
                    "write returned {written} (expected {avail})"
                )));
            }
            self.pending += avail;
            src_offset += avail;
            remaining -= avail;
        }
        self.tx.clear();
        Ok(())
    }

    fn send_inner(&mut self, buf: &[u8], discard_rx_data: bool) -> Result<()> {
        for &byte in buf {
            for _ in 0..self.baud_multiplier {
                if discard_rx_data {
                    self.discard += 1;
                }
                if self.tx.push(byte) {
                    self.flush()?;
                }
            }
        }
        Ok(())
    }

    pub fn send(&mut self, buf: &[u8]) -> Result<()> { self.send_inner(buf, false) }

    pub fn send_and_discard(&mut self, buf: &[u8]) -> Result<()> { self.send_inner(buf, true) }

    /// Flush, then read back exactly `buf.len()` logical bytes (honoring
    /// any pending discard count and the baud multiplier's repeated
    /// echoes), matching `ft245r_recv`.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        self.flush()?;
        self.fill()?;

        while self.discard > 0 {
            self.rx_buf_fill_and_get()?;
            self.discard -= 1;
        }

        for slot in buf.iter_mut() {
            *slot = self.rx_buf_fill_and_get()?;
            for _ in 1..self.baud_multiplier {
                self.rx_buf_fill_and_get()?;
            }
        }
        Ok(())
    }

    /// Flush pending writes, then sleep — mirrors `ft245r_usleep`: a sleep
    /// must not leave bytes sitting unflushed in the TX batch.
    pub fn usleep(&mut self, duration: Duration) -> Result<()> {
        self.flush()?;
        std::thread::sleep(duration);
        Ok(())
    }

    pub fn set_pin(&mut self, pin: LogicalPin, value: bool) -> Result<()> {
        if self.pins.get(pin).mask == 0 {
            return Ok(());
        }
        self.out = self.pins.set_bit(self.out, pin, value);
        let out = self.out;
        self.send_and_discard(&[out])
    }

    pub fn get_pin(&mut self, pin: LogicalPin) -> Result<bool> {
        self.flush()?;
        let byte = self.transport.read_pins()?;
        Ok(self.pins.get_bit(byte, pin))
    }

    /// Send the initial output byte once the session is open: RESET
    /// asserted, every other output pin deasserted (`ft245r_open`).
    pub fn drive_initial_outputs(&mut self) -> Result<()> {
        self.out = 0;
        for pin in [
            LogicalPin::Reset,
            LogicalPin::Sck,
            LogicalPin::Sdo,
            LogicalPin::Buff,
            LogicalPin::Vcc,
            LogicalPin::LedErr,
            LogicalPin::LedRdy,
            LogicalPin::LedPgm,
            LogicalPin::LedVfy,
        ] {
            let value = pin == LogicalPin::Reset;
            self.out = self.pins.set_bit(self.out, pin, value);
        }
        let out = self.out;
        self.send_and_discard(&[out])
    }

    /// Emit one SPI/TPI bit as two bus bytes: SCK low with SDO set to
    /// `bit`, then SCK high (`spec.md` §4.A). Appends to `buf`, which the
    /// caller sends as one batch once a whole command/frame is built.
    pub fn push_bit(&mut self, buf: &mut Vec<u8>, bit: bool) {
        self.out = self.pins.set_bit(self.out, LogicalPin::Sdo, bit);
        self.out = self.pins.set_bit(self.out, LogicalPin::Sck, false);
        buf.push(self.out);
        self.out = self.pins.set_bit(self.out, LogicalPin::Sck, true);
        buf.push(self.out);
    }

    /// Pull SCK low without clocking a data bit — the terminator byte
    /// appended after the very last command in a fragment so the final
    /// SDI bit has a stable clock edge to be sampled against.
    pub fn push_sck_low(&mut self, buf: &mut Vec<u8>) {
        self.out = self.pins.set_bit(self.out, LogicalPin::Sck, false);
        buf.push(self.out);
    }

    pub fn sample_sdi(&self, buf: &[u8], index: usize) -> bool {
        self.pins.get_bit(buf[index], LogicalPin::Sdi)
    }
}
