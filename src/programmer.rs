//! The `Programmer`: paged flash/EEPROM driver and session control
//! (components G and H), and the operation table exposed to the shell
//! (`spec.md` §6).
//!
//! Everything below this layer (pin encoding, the FIFO flow controller, the
//! ISP/TPI codecs, the pipelined request queue) is pure and transport-
//! generic; `Programmer` is where those pieces are wired together into the
//! session lifecycle a higher-level driver shell actually calls.

use std::time::Duration;

use crate::config::Config;
use crate::error::{Ft245rError, Result};
use crate::io::Io;
use crate::part::{Memory, MemoryKind, PartDescriptor};
use crate::pins::LogicalPin;
use crate::queue::{PendingRequest, RequestQueue};
use crate::spi::{self, CMD_SIZE, FRAGMENT_CMDS};
use crate::tpi::{self, TPI_CMD_SLDCS, TPI_CMD_SSTCS, TPI_GUARD_TIME_0B, TPI_IDENT, TPI_REG_TPIIR, TPI_REG_TPIPCR};
use crate::transport::{BitMode, FtdiTransport};

/// How many times `program_enable` retries before giving up, pulsing RESET
/// between every attempt but the last (`spec.md` §4.H).
const PROGRAM_ENABLE_RETRIES: u32 = 4;

/// A bit-banged ISP/TPI programming session over one FTDI FT232R/FT245R
/// device. Generic over the transport so the same logic drives a real
/// `libftdi`-backed implementation or, in tests, the loopback mocks in
/// [`crate::testutil`].
pub struct Programmer<T: FtdiTransport> {
    io: Io<T>,
    queue: RequestQueue,
    allow_strap_mismatch: bool,
}

impl<T: FtdiTransport> Programmer<T> {
    /// `setup` + `open` collapsed into one fallible constructor: parses the
    /// port string, opens the transport by vid/pid/serial/index, validates
    /// the pin assignment, and brings the device up in synchronous
    /// bit-bang mode with the initial output byte driven (`spec.md` §4.H
    /// "Open"). The transport handle is consumed either way -- on error it
    /// is simply dropped, so there is no leaked handle on any exit path.
    pub fn open(mut transport: T, config: &Config, port: &str) -> Result<Self> {
        if let Some(missing) = config.pins.missing_mandatory() {
            return Err(Ft245rError::configuration(format!("required pin {missing} has no mask assigned")));
        }

        let port_spec = crate::config::PortSpec::parse(port)?;
        let vid = config.vendor_id();
        let pid = config.product_id();
        let product = config.usb_product.as_deref();
        match &port_spec {
            crate::config::PortSpec::Index(idx) => transport.open_by(vid, pid, product, None, *idx)?,
            crate::config::PortSpec::Serial(serial) => transport.open_by(vid, pid, product, Some(serial), 0)?,
        }

        let ddr = config.pins.data_direction();
        transport.set_latency_timer(1)?;
        transport.set_bitmode(ddr, BitMode::SyncBitBang)?;
        let (programmed_baud, multiplier) = config.resolve_bitclock();
        transport.set_baudrate(programmed_baud)?;

        let mut io = Io::new(transport, config.pins.clone(), multiplier);
        io.drain()?;
        io.drive_initial_outputs()?;

        Ok(Programmer {
            io,
            queue: RequestQueue::new(),
            allow_strap_mismatch: config.extra_features.override_sdo_sdi_strap_check,
        })
    }

    /// Idempotent teardown of the transport: flip to synchronous-bit-bang
    /// with every pin released, then to `Reset` (which also flushes the
    /// FTDI FIFO), then close the handle.
    pub fn close(&mut self) -> Result<()> {
        self.io.transport_mut().set_bitmode(0, BitMode::SyncBitBang)?;
        self.io.transport_mut().set_bitmode(0, BitMode::Reset)?;
        self.io.transport_mut().close()
    }

    /// Consumes the session. Request queue and session state are freed by
    /// ordinary Rust drop order; this exists only to name the operation the
    /// shell contract expects (`spec.md` §6 `teardown`).
    pub fn teardown(self) {}

    /// A human-readable dump of the current pin assignment, for
    /// diagnostics (the Rust analogue of `ft245r_display`; `spec.md` §9
    /// drops the unused `display` plumbing the original threaded through
    /// unrelated operations instead).
    pub fn describe(&self) -> String { self.io.pins().describe() }

    pub fn enable(&mut self) -> Result<()> {
        self.io.set_pin(LogicalPin::Reset, false)?;
        self.io.usleep(Duration::from_micros(1))?;
        self.io.set_pin(LogicalPin::Buff, true)
    }

    pub fn disable(&mut self) -> Result<()> { self.io.set_pin(LogicalPin::Buff, false) }

    pub fn powerup(&mut self) -> Result<()> {
        self.io.set_pin(LogicalPin::Vcc, true)?;
        self.io.usleep(Duration::from_micros(100))
    }

    pub fn powerdown(&mut self) -> Result<()> { self.io.set_pin(LogicalPin::Vcc, false) }

    pub fn rdy_led(&mut self, on: bool) -> Result<()> { self.io.set_pin(LogicalPin::LedRdy, on) }
    pub fn err_led(&mut self, on: bool) -> Result<()> { self.io.set_pin(LogicalPin::LedErr, on) }
    pub fn pgm_led(&mut self, on: bool) -> Result<()> { self.io.set_pin(LogicalPin::LedPgm, on) }
    pub fn vfy_led(&mut self, on: bool) -> Result<()> { self.io.set_pin(LogicalPin::LedVfy, on) }

    /// Reset/power sequencing followed by either the TPI handshake or ISP
    /// program-enable, depending on the part (`spec.md` §4.H "Reset &
    /// enable" and "Initialize").
    pub fn initialize(&mut self, part: &dyn PartDescriptor) -> Result<()> {
        self.io.set_pin(LogicalPin::Sck, false)?;
        self.powerup()?;
        self.io.set_pin(LogicalPin::Reset, true)?;
        self.io.usleep(Duration::from_millis(5))?;
        self.io.set_pin(LogicalPin::Reset, false)?;
        self.io.usleep(Duration::from_millis(5))?;
        self.io.usleep(Duration::from_millis(20))?;

        if part.is_tpi() {
            self.tpi_initialize()
        } else {
            self.program_enable(part)
        }
    }

    /// Verify the SDO<->SDI strap (TPI parts don't turn the line around;
    /// SDO is held high and SDI is wired through a resistor to it), hold
    /// SDO high for 16 SCK cycles, write the guard-time register, then read
    /// back the identification register and require it reads `0x80`
    /// (`spec.md` §4.E "Initialization for TPI").
    fn tpi_initialize(&mut self) -> Result<()> {
        self.io.set_pin(LogicalPin::Sdo, false)?;
        let sampled_low = self.io.get_pin(LogicalPin::Sdi)?;
        self.io.set_pin(LogicalPin::Sdo, true)?;
        let sampled_high = self.io.get_pin(LogicalPin::Sdi)?;
        if sampled_low || !sampled_high {
            if self.allow_strap_mismatch {
                log::warn!("SDO/SDI strap mismatch (low={sampled_low}, high={sampled_high}), continuing");
            } else {
                return Err(Ft245rError::protocol("TPI SDO/SDI strap not wired".to_string()));
            }
        }

        let mut buf = Vec::with_capacity(32);
        for _ in 0..16 {
            self.io.push_bit(&mut buf, true);
        }
        self.io.send_and_discard(&buf)?;

        tpi::cmd_tpi(&mut self.io, &[TPI_CMD_SSTCS | TPI_REG_TPIPCR, TPI_GUARD_TIME_0B], 0)?;

        let res = tpi::cmd_tpi(&mut self.io, &[TPI_CMD_SLDCS | TPI_REG_TPIIR], 1)?;
        if res[0] != TPI_IDENT {
            return Err(Ft245rError::protocol(format!("TPIIR {:#04x} not correct", res[0])));
        }
        Ok(())
    }

    /// Transmit the part's `Programming_enable` command and check the poll
    /// byte, retrying up to [`PROGRAM_ENABLE_RETRIES`] times with a RESET
    /// pulse between attempts. On the final failed attempt the device is
    /// fully drained (bitmode `Reset` then back to `SyncBitBang`, RX ring
    /// purged) before giving up (`spec.md` §4.H "Program-enable").
    fn program_enable(&mut self, part: &dyn PartDescriptor) -> Result<()> {
        let enable_cmd = part
            .program_enable_cmd()
            .ok_or_else(|| Ft245rError::configuration("part has no program-enable opcode".to_string()))?;
        let poll_index = part.poll_index();
        let poll_value = part.poll_value();

        for attempt in 0..PROGRAM_ENABLE_RETRIES {
            let res = spi::cmd(&mut self.io, enable_cmd)?;
            if res[poll_index - 1] == poll_value {
                return Ok(());
            }
            if attempt + 1 == PROGRAM_ENABLE_RETRIES {
                self.io.drain()?;
                return Err(Ft245rError::protocol(
                    "AVR device not responding to programming enable".to_string(),
                ));
            }
            self.io.set_pin(LogicalPin::Reset, true)?;
            self.io.usleep(Duration::from_millis(1))?;
            self.io.set_pin(LogicalPin::Reset, false)?;
            self.io.usleep(Duration::from_millis(1))?;
        }
        unreachable!("loop always returns or errors before exhausting PROGRAM_ENABLE_RETRIES")
    }

    /// Dispatches to the TPI erase path for TPI parts, otherwise issues the
    /// ISP `CHIP_ERASE` opcode; either way sleeps the part's chip-erase
    /// delay and re-runs `initialize` afterward (`spec.md` §4.C supplement,
    /// `SPEC_FULL.md` §4).
    pub fn chip_erase(&mut self, part: &dyn PartDescriptor) -> Result<()> {
        if part.is_tpi() {
            let erase_cmd = part
                .tpi_chip_erase_cmd()
                .ok_or_else(|| Ft245rError::configuration("part has no TPI chip-erase command".to_string()))?;
            tpi::cmd_tpi(&mut self.io, &erase_cmd, 0)?;
        } else {
            let erase_cmd = part
                .chip_erase_cmd()
                .ok_or_else(|| Ft245rError::configuration("part has no chip-erase opcode".to_string()))?;
            spi::cmd(&mut self.io, erase_cmd)?;
        }
        self.io.usleep(Duration::from_micros(part.chip_erase_delay_us() as u64))?;
        self.initialize(part)
    }

    pub fn cmd(&mut self, command: [u8; 4]) -> Result<[u8; 4]> { spi::cmd(&mut self.io, command) }

    pub fn cmd_tpi(&mut self, command: &[u8], res_len: usize) -> Result<Vec<u8>> {
        tpi::cmd_tpi(&mut self.io, command, res_len)
    }

    pub fn read_byte(&mut self, mem: &mut dyn Memory, addr: usize) -> Result<u8> { mem.read_byte_default(addr) }

    pub fn write_byte(&mut self, mem: &mut dyn Memory, addr: usize, value: u8) -> Result<()> {
        mem.write_byte_default(addr, value)
    }

    /// Pop and receive the oldest queued fragment, decoding its `n` data
    /// bytes (if any, skipping `skip` leading sub-commands) into `mem`
    /// (`spec.md` §4.F "Node recycling" -- the ring slot is simply reused
    /// on the next `push`, there being no separate free-list to maintain).
    fn drain_one(&mut self, mem: &mut dyn Memory) -> Result<()> {
        let Some(req) = self.queue.pop() else { return Ok(()) };
        let mut resp = vec![0u8; req.bytes];
        self.io.recv(&mut resp)?;
        for k in 0..req.n {
            let value = spi::extract_response_byte(&self.io, &resp, (req.skip + k) * 4 + 3);
            mem.buf_write(req.addr + k, value);
        }
        Ok(())
    }

    fn drain_all(&mut self, mem: &mut dyn Memory) -> Result<()> {
        while !self.queue.is_empty() {
            self.drain_one(mem)?;
        }
        Ok(())
    }

    /// Flash paged write: stages LOADPAGE commands through the pipelined
    /// request queue, committing a page via [`Memory::write_page`] at every
    /// page boundary and, unconditionally, on the final fragment -- a
    /// trailing sub-page write still has to land in flash even though it
    /// never reaches a boundary (`spec.md` §4.G "Flash page write"). EEPROM
    /// falls back to the shell's byte-at-a-time defaults; any other memory
    /// kind is a shell-level failure.
    pub fn paged_write(
        &mut self,
        part: &dyn PartDescriptor,
        mem: &mut dyn Memory,
        page_size: usize,
        addr: usize,
        n: usize,
    ) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        match mem.kind() {
            MemoryKind::Other => {
                return Err(Ft245rError::shell("memory kind does not support paged write".to_string()));
            }
            MemoryKind::Eeprom => {
                for a in addr..addr + n {
                    let byte = mem.buf_read(a);
                    mem.write_byte_default(a, byte)?;
                }
                return Ok(n);
            }
            MemoryKind::Flash => {}
        }

        let mut buf: Vec<u8> = Vec::with_capacity(FRAGMENT_CMDS * CMD_SIZE + CMD_SIZE);
        let mut fragment_cmds = 0usize;
        let mut addr_save = addr;

        for i in 0..n {
            let cur = addr + i;
            if fragment_cmds == 0 {
                addr_save = cur;
            }
            let hi = cur % 2 == 1;
            let word_addr = (cur / 2) as u32;
            let data = mem.buf_read(cur);
            let command = part
                .load_page_cmd(hi, word_addr, data)
                .ok_or_else(|| Ft245rError::configuration("part has no LOADPAGE opcode".to_string()))?;
            spi::encode_cmd(&mut self.io, &mut buf, command);
            fragment_cmds += 1;

            let at_page_boundary = (cur + 1) % page_size == 0;
            let at_last_byte = i + 1 == n;
            let fragment_full = fragment_cmds == FRAGMENT_CMDS;

            if at_page_boundary || fragment_full || at_last_byte {
                if at_last_byte {
                    spi::encode_guard_byte(&mut self.io, &mut buf);
                } else {
                    let last = *buf.last().expect("just encoded a command");
                    buf.push(last);
                }
                self.io.send(&buf)?;
                self.queue.push(PendingRequest { addr: addr_save, bytes: buf.len(), n: 0, skip: 0 })?;
                buf.clear();
                fragment_cmds = 0;

                if self.queue.over_threshold() {
                    self.drain_one(mem)?;
                }
                // The final fragment must always commit its page, even when
                // it falls short of a full page (a sub-page write, or a
                // trailing partial page) -- otherwise the loaded data is
                // never written to flash (`avr_write_page`'s
                // `i % page_size == 0 || i >= n_bytes` commit condition).
                if at_page_boundary || at_last_byte {
                    self.drain_all(mem)?;
                    mem.write_page((cur / page_size) * page_size)?;
                }
            }
        }
        self.drain_all(mem)?;
        Ok(n)
    }

    /// Flash paged load: stages READ commands through the pipelined
    /// request queue, decoding each fragment's responses back into `mem`
    /// as soon as it drains. Emits the part's `LOAD_EXT_ADDR` opcode once
    /// at the top of every page, if the part defines one (`spec.md` §4.G
    /// "Flash page load").
    pub fn paged_load(
        &mut self,
        part: &dyn PartDescriptor,
        mem: &mut dyn Memory,
        page_size: usize,
        addr: usize,
        n: usize,
    ) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        match mem.kind() {
            MemoryKind::Other => {
                return Err(Ft245rError::shell("memory kind does not support paged load".to_string()));
            }
            MemoryKind::Eeprom => {
                for a in addr..addr + n {
                    let value = mem.read_byte_default(a)?;
                    mem.buf_write(a, value);
                }
                return Ok(n);
            }
            MemoryKind::Flash => {}
        }

        let mut buf: Vec<u8> = Vec::with_capacity(FRAGMENT_CMDS * CMD_SIZE + CMD_SIZE);
        let mut fragment_cmds = 0usize;
        let mut read_cmds = 0usize;
        let mut skip = 0usize;
        let mut addr_save = addr;

        for i in 0..n {
            let cur = addr + i;
            if fragment_cmds == 0 {
                addr_save = cur;
                skip = 0;
                if cur % page_size == 0 {
                    if let Some(ext_cmd) = part.load_ext_addr_cmd((cur / 2) as u32) {
                        spi::encode_cmd(&mut self.io, &mut buf, ext_cmd);
                        fragment_cmds += 1;
                        skip = 1;
                    }
                }
            }

            let hi = cur % 2 == 1;
            let word_addr = (cur / 2) as u32;
            let command = part
                .read_cmd(hi, word_addr)
                .ok_or_else(|| Ft245rError::configuration("part has no READ opcode".to_string()))?;
            spi::encode_cmd(&mut self.io, &mut buf, command);
            fragment_cmds += 1;
            read_cmds += 1;

            let at_page_boundary = (cur + 1) % page_size == 0;
            let at_last_byte = i + 1 == n;
            let fragment_full = fragment_cmds == FRAGMENT_CMDS;

            if at_page_boundary || fragment_full || at_last_byte {
                if at_last_byte {
                    spi::encode_guard_byte(&mut self.io, &mut buf);
                } else {
                    let last = *buf.last().expect("just encoded a command");
                    buf.push(last);
                }
                self.io.send(&buf)?;
                self.queue.push(PendingRequest { addr: addr_save, bytes: buf.len(), n: read_cmds, skip })?;
                buf.clear();
                fragment_cmds = 0;
                read_cmds = 0;

                if self.queue.over_threshold() {
                    self.drain_one(mem)?;
                }
            }
        }
        self.drain_all(mem)?;
        Ok(n)
    }
}
