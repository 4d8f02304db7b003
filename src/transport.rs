//! The FTDI transport contract (external collaborator, `spec.md` §1/§6).
//!
//! This driver never talks to libusb/libftdi directly — managing the USB
//! enumeration library is explicitly out of scope. Instead it is generic
//! over any type implementing [`FtdiTransport`], so the actual USB plumbing
//! is supplied by the caller (or, for tests, by the loopback mock in
//! [`crate::testutil`]).

use crate::error::Result;

/// Synchronous bit-bang mode, as opposed to e.g. MPSSE or async bit-bang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    /// All pins released back to inputs; also flushes the FTDI FIFO when
    /// transitioning out of `SyncBitBang` (`spec.md` §4.H "Close").
    Reset,
    /// Every written byte drives `ddr`'s output pins and is echoed back as
    /// the sampled input state one byte-time later.
    SyncBitBang,
}

/// Abstract handle to an FTDI FT232R/FT245R device, opened in synchronous
/// bit-bang mode. One write call always corresponds to one prospective read
/// call of the same length; the flow controller (component C) is what
/// guarantees the two stay in lockstep.
pub trait FtdiTransport {
    /// Open a device by VID/PID, optionally narrowed by product string,
    /// serial number, or a 0-based index among matching devices.
    fn open_by(
        &mut self,
        vid: u16,
        pid: u16,
        product: Option<&str>,
        serial: Option<&str>,
        index: u32,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn set_latency_timer(&mut self, millis: u8) -> Result<()>;

    fn set_bitmode(&mut self, ddr: u8, mode: BitMode) -> Result<()>;

    fn set_baudrate(&mut self, hz: u32) -> Result<()>;

    /// Sample the 8 GPIO pins without driving a clock edge.
    fn read_pins(&mut self) -> Result<u8>;

    /// Read up to `buf.len()` bytes, returning the number actually read.
    /// May return fewer bytes than requested; never blocks past what the
    /// device currently has buffered in the way a real `read()` wouldn't.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf`, returning the number of bytes actually written. A
    /// short write that isn't a transport error is still an error at this
    /// layer — every byte written must be accounted against `pending`.
    fn write_data(&mut self, buf: &[u8]) -> Result<usize>;
}
