//! The "part description provider" contract (external collaborator,
//! `spec.md` §1/§6).
//!
//! Enumerating AVR parts and their opcodes is explicitly out of scope for
//! this crate (`spec.md` §1 Non-goals): the part database lives on the
//! caller's side. What this crate needs from a part is a small, opaque
//! set of capabilities — bit templates for the handful of ISP opcodes it
//! drives directly, poll index/value for program-enable, and whether the
//! part uses TPI instead of ISP.

use crate::error::Result;

/// A 4-byte ISP command template with fixed opcode bits already set; the
/// driver only needs to overlay address/data bits (`avr_set_bits` /
/// `avr_set_addr` / `avr_set_input` in the original source are the part
/// database's job, not this crate's).
pub type IspCommand = [u8; 4];

/// The part description provider. `None` return values mean "this part
/// doesn't define that opcode", which the caller turns into a
/// `Ft245rError::Configuration` before any I/O is attempted.
pub trait PartDescriptor {
    /// True if this part is programmed over TPI rather than ISP.
    fn is_tpi(&self) -> bool { false }

    /// The 4-byte `Programming_enable` ISP command, fully populated.
    fn program_enable_cmd(&self) -> Option<IspCommand>;

    /// 1-based index into the 4-byte response that must equal
    /// [`PartDescriptor::poll_value`] for program-enable to have
    /// succeeded (`spec.md` §4.H).
    fn poll_index(&self) -> usize;

    fn poll_value(&self) -> u8;

    /// The 4-byte `Chip erase` ISP command, if defined for this part.
    fn chip_erase_cmd(&self) -> Option<IspCommand>;

    /// How long to sleep, in microseconds, after issuing chip erase before
    /// re-initializing.
    fn chip_erase_delay_us(&self) -> u32;

    /// `LOADPAGE_HI`/`LOADPAGE_LO`, fully populated with the word address
    /// and the data byte to load. `word_addr` is the AVR word address
    /// (`byte_addr / 2`).
    fn load_page_cmd(&self, hi: bool, word_addr: u32, data: u8) -> Option<IspCommand>;

    /// `READ_HI`/`READ_LO`, fully populated with the word address to read.
    fn read_cmd(&self, hi: bool, word_addr: u32) -> Option<IspCommand>;

    /// `LOAD_EXTENDED_ADDRESS`, if this part has >64 KiB of flash and
    /// therefore defines that opcode.
    fn load_ext_addr_cmd(&self, word_addr: u32) -> Option<IspCommand>;

    /// Raw TPI bytes (register address plus NVM command write) that erase
    /// the whole chip on a TPI part. `None` means this part doesn't support
    /// (or need) a driver-issued TPI chip erase (`spec.md` §6 `chip_erase`).
    fn tpi_chip_erase_cmd(&self) -> Option<Vec<u8>> { None }
}

/// Which kind of memory a [`Memory`] handle addresses; flash supports
/// pipelined paged access, EEPROM and everything else falls back to
/// byte-at-a-time defaults (`spec.md` §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Flash,
    Eeprom,
    Other,
}

/// The host-side memory image the driver reads into / writes out of during
/// paged operations, borrowed for the duration of the call (`spec.md` §5
/// "Shared resources"). Implementations own the actual byte buffer; this
/// crate never allocates or owns `m->buf` itself.
pub trait Memory {
    fn kind(&self) -> MemoryKind;

    fn page_size(&self) -> usize;

    /// Read one byte already staged in the in-memory image (used while
    /// building loadpage commands from data already present in `buf`).
    fn buf_read(&self, addr: usize) -> u8;

    /// Stage one byte read back from the device into the in-memory image.
    fn buf_write(&mut self, addr: usize, value: u8);

    /// Commit a previously loaded page starting at `page_base_addr`
    /// (always page-aligned). Corresponds to `avr_write_page`.
    fn write_page(&mut self, page_base_addr: usize) -> Result<()>;

    /// Shell's byte-at-a-time default write, used for EEPROM/other memory.
    fn write_byte_default(&mut self, addr: usize, value: u8) -> Result<()>;

    /// Shell's byte-at-a-time default read, used for EEPROM/other memory.
    fn read_byte_default(&mut self, addr: usize) -> Result<u8>;
}
