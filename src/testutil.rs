//! Loopback/scripted transports and trivial part/memory stand-ins used by
//! the test suite (gated behind the `test-util` feature so downstream
//! crates can reuse them too, mirroring the hosted-mode stub pattern used
//! for services that otherwise talk to real hardware).

use std::collections::VecDeque;

use crate::error::Result;
use crate::part::{IspCommand, Memory, MemoryKind, PartDescriptor};
use crate::pins::{LogicalPin, PinMap};
use crate::transport::{BitMode, FtdiTransport};

/// A pure wire-level transport: every byte read back is whatever was
/// written one byte-time earlier, with no notion of a target device on the
/// other end of the link. Good for exercising the bit encoder/decoder and
/// the FIFO flow controller in isolation, and for any higher-level flow
/// (like a paged flash write) that never inspects the content of what
/// comes back.
pub struct MockTransport {
    echo: VecDeque<u8>,
    last_written: u8,
    pin_snapshot: Option<u8>,
    write_log_len: usize,
}

impl MockTransport {
    pub fn looping_back() -> Self {
        MockTransport { echo: VecDeque::new(), last_written: 0, pin_snapshot: None, write_log_len: 0 }
    }

    pub fn write_log_len(&self) -> usize { self.write_log_len }

    /// Force the next `read_pins` calls to return `byte` regardless of what
    /// was last written, overriding the default "reads back whatever is
    /// currently driven" behavior.
    pub fn set_pin_snapshot(&mut self, byte: u8) { self.pin_snapshot = Some(byte); }
}

impl FtdiTransport for MockTransport {
    fn open_by(&mut self, _vid: u16, _pid: u16, _product: Option<&str>, _serial: Option<&str>, _index: u32) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> { Ok(()) }

    fn set_latency_timer(&mut self, _millis: u8) -> Result<()> { Ok(()) }

    fn set_bitmode(&mut self, _ddr: u8, _mode: BitMode) -> Result<()> { Ok(()) }

    fn set_baudrate(&mut self, _hz: u32) -> Result<()> { Ok(()) }

    fn read_pins(&mut self) -> Result<u8> { Ok(self.pin_snapshot.unwrap_or(self.last_written)) }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.echo.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.echo.pop_front().expect("bounded by n above");
        }
        Ok(n)
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        for &byte in buf {
            self.echo.push_back(self.last_written);
            self.last_written = byte;
            self.write_log_len += 1;
        }
        Ok(buf.len())
    }
}

/// A transport whose replies are scripted ahead of time rather than
/// derived from what gets written. Use [`encode_response_bytes`] and
/// [`encode_tpi_window`] to build the scripted stream so it lines up with
/// exactly what [`crate::spi::decode_cmd`]/[`crate::spi::extract_response_byte`]
/// or the TPI frame decoder will read out of it. `read_pins` mirrors
/// whatever byte was last written, which is enough to satisfy the
/// SDO-SDI wiring self-test TPI identification performs.
pub struct ScriptedTransport {
    script: VecDeque<u8>,
    last_written: u8,
}

impl ScriptedTransport {
    pub fn new(script: Vec<u8>) -> Self { ScriptedTransport { script: script.into(), last_written: 0 } }

    pub fn push_bytes(&mut self, bytes: &[u8]) { self.script.extend(bytes.iter().copied()); }
}

impl FtdiTransport for ScriptedTransport {
    fn open_by(&mut self, _vid: u16, _pid: u16, _product: Option<&str>, _serial: Option<&str>, _index: u32) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> { Ok(()) }

    fn set_latency_timer(&mut self, _millis: u8) -> Result<()> { Ok(()) }

    fn set_bitmode(&mut self, _ddr: u8, _mode: BitMode) -> Result<()> { Ok(()) }

    fn set_baudrate(&mut self, _hz: u32) -> Result<()> { Ok(()) }

    fn read_pins(&mut self) -> Result<u8> { Ok(self.last_written) }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.script.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.script.pop_front().expect("bounded by n above");
        }
        Ok(n)
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(&last) = buf.last() {
            self.last_written = last;
        }
        Ok(buf.len())
    }
}

/// Build a raw response buffer such that
/// `extract_response_byte(io, &buf, i) == responses[i]` for every `i`,
/// matching the layout `spi::encode_cmd`/`decode_cmd` expect: 16 raw bytes
/// per logical response byte plus one trailing guard byte.
pub fn encode_response_bytes(pins: &PinMap, responses: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; responses.len() * 16 + 1];
    for (m, &value) in responses.iter().enumerate() {
        let base = m * 16;
        let mut pos = base + 2;
        let mut bit = 0x80u8;
        for _ in 0..8 {
            let want = (value & bit) != 0;
            buf[pos] = pins.set_bit(buf[pos], LogicalPin::Sdi, want);
            pos += 2;
            bit >>= 1;
        }
    }
    buf
}

/// Build the 32-byte raw window `tpi::tpi_rx` samples, such that decoding
/// it recovers the 16-bit `res` word the TPI frame hunter expects.
pub fn encode_tpi_window(pins: &PinMap, res: u16) -> Vec<u8> {
    let mut buf = vec![0u8; 32];
    for i in 0..16u32 {
        let pos = 1 + 2 * i as usize;
        let want = (res & (1 << i)) != 0;
        buf[pos] = pins.set_bit(buf[pos], LogicalPin::Sdi, want);
    }
    buf
}

/// A minimal ISP part: `Programming_enable`/`Chip erase` ack at response
/// byte 2, `LOADPAGE`/`READ` with a 14-bit word address and no extended
/// addressing -- enough surface for the paged access and program-enable
/// tests without modeling any real device's exact opcode table.
pub struct MockIspPart;

impl PartDescriptor for MockIspPart {
    fn program_enable_cmd(&self) -> Option<IspCommand> { Some([0xAC, 0x53, 0x00, 0x00]) }

    fn poll_index(&self) -> usize { 2 }

    fn poll_value(&self) -> u8 { 0x53 }

    fn chip_erase_cmd(&self) -> Option<IspCommand> { Some([0xAC, 0x80, 0x00, 0x00]) }

    fn chip_erase_delay_us(&self) -> u32 { 9_000 }

    fn load_page_cmd(&self, hi: bool, word_addr: u32, data: u8) -> Option<IspCommand> {
        let op = if hi { 0x48 } else { 0x40 };
        Some([op, (word_addr >> 8) as u8, word_addr as u8, data])
    }

    fn read_cmd(&self, hi: bool, word_addr: u32) -> Option<IspCommand> {
        let op = if hi { 0x28 } else { 0x20 };
        Some([op, (word_addr >> 8) as u8, word_addr as u8, 0])
    }

    fn load_ext_addr_cmd(&self, _word_addr: u32) -> Option<IspCommand> { None }
}

/// A TPI part. Identification happens entirely inside `Programmer::initialize`;
/// the rest of [`PartDescriptor`] doesn't apply to TPI parts and is left at
/// harmless defaults.
pub struct MockTpiPart;

impl PartDescriptor for MockTpiPart {
    fn is_tpi(&self) -> bool { true }

    fn program_enable_cmd(&self) -> Option<IspCommand> { None }

    fn poll_index(&self) -> usize { 0 }

    fn poll_value(&self) -> u8 { 0 }

    fn chip_erase_cmd(&self) -> Option<IspCommand> { None }

    fn chip_erase_delay_us(&self) -> u32 { 10_000 }

    fn load_page_cmd(&self, _hi: bool, _word_addr: u32, _data: u8) -> Option<IspCommand> { None }

    fn read_cmd(&self, _hi: bool, _word_addr: u32) -> Option<IspCommand> { None }

    fn load_ext_addr_cmd(&self, _word_addr: u32) -> Option<IspCommand> { None }

    fn tpi_chip_erase_cmd(&self) -> Option<Vec<u8>> { Some(vec![0xC0 | 0x02, 0x10]) }
}

/// An in-memory byte image standing in for avrdude's `AVRMEM`.
pub struct MockMemory {
    kind: MemoryKind,
    page_size: usize,
    buf: Vec<u8>,
    pub write_page_calls: Vec<usize>,
}

impl MockMemory {
    pub fn new(kind: MemoryKind, page_size: usize, size: usize) -> Self {
        MockMemory { kind, page_size, buf: vec![0u8; size], write_page_calls: Vec::new() }
    }

    pub fn buf(&self) -> &[u8] { &self.buf }

    pub fn buf_mut(&mut self) -> &mut [u8] { &mut self.buf }
}

impl Memory for MockMemory {
    fn kind(&self) -> MemoryKind { self.kind }

    fn page_size(&self) -> usize { self.page_size }

    fn buf_read(&self, addr: usize) -> u8 { self.buf[addr] }

    fn buf_write(&mut self, addr: usize, value: u8) { self.buf[addr] = value; }

    fn write_page(&mut self, page_base_addr: usize) -> Result<()> {
        self.write_page_calls.push(page_base_addr);
        Ok(())
    }

    fn write_byte_default(&mut self, addr: usize, value: u8) -> Result<()> {
        self.buf[addr] = value;
        Ok(())
    }

    fn read_byte_default(&mut self, addr: usize) -> Result<u8> { Ok(self.buf[addr]) }
}
