//! TPI (Tiny Programming Interface) bit codec and the `cmd_tpi` operation
//! (component E).
//!
//! TPI has its own 12-bit-time async frame on top of the same clocked-bit
//! primitive ISP uses: `1 start + 8 data (LSB first) + 1 parity + 2 stop`.
//! Transmit is fire-and-forget (`send_and_discard`, mirroring
//! `ft245r_tpi_tx`); receive drives 16 clock pulses with SDO held idle-high
//! (`ft245r_tpi_rx`'s two `set_data(0xff)` calls) so the real start bit is
//! guaranteed to land somewhere in the sampled window, then hunts for it.

use crate::error::{Ft245rError, Result};
use crate::io::Io;
use crate::transport::FtdiTransport;

/// `SLDCS`/`SSTCS` (Status/control space load/store) and the identification
/// and programming-control-and-status register addresses -- these are
/// fixed TPI protocol constants, not part-specific (`tpi.h` in the original
/// source tree, not reproduced in this crate since it's a handful of
/// addresses this driver itself needs).
pub const TPI_CMD_SLDCS: u8 = 0x80;
pub const TPI_CMD_SSTCS: u8 = 0xC0;
pub const TPI_REG_TPIIR: u8 = 0x0F;
pub const TPI_REG_TPIPCR: u8 = 0x02;

/// Guard-time bits value written to TPIPCR during identification, matching
/// `TPIPCR_GT_0b` (guard time = 0 bit periods, the fastest setting).
pub const TPI_GUARD_TIME_0B: u8 = 0x07;

/// Expected `TPIIR` contents on every TPI-capable part.
pub const TPI_IDENT: u8 = 0x80;

/// Clock out one TPI frame for `byte` and discard whatever echoes back --
/// there is nothing meaningful to read during a transmit (`ft245r_tpi_tx`).
pub fn tpi_tx<T: FtdiTransport>(io: &mut Io<T>, byte: u8) -> Result<()> {
    let mut buf = Vec::with_capacity(22);
    io.push_bit(&mut buf, false); // start bit

    let mut parity = false;
    let mut bit = 0x01u8;
    for _ in 0..8 {
        let set = (byte & bit) != 0;
        io.push_bit(&mut buf, set);
        parity ^= set;
        bit <<= 1;
    }

    io.push_bit(&mut buf, parity);
    io.push_bit(&mut buf, true); // stop 1
    io.push_bit(&mut buf, true); // stop 2

    io.send_and_discard(&buf)
}

/// Drive 16 clock pulses with SDO idle-high and sample SDI into a 16-bit
/// window (`ft245r_tpi_rx`'s pre-read). The raw bit-within-pair offset used
/// here (1, not the pipeline-delay-compensated offset ISP's `extract_data`
/// uses) doesn't matter for correctness: the frame's own start-bit search
/// re-aligns to wherever the response actually landed in the window.
fn sample_window<T: FtdiTransport>(io: &mut Io<T>) -> Result<u32> {
    let mut buf = Vec::with_capacity(32);
    for _ in 0..2 {
        let mut bit = 0x80u8;
        for _ in 0..8 {
            io.push_bit(&mut buf, (0xffu8 & bit) != 0);
            bit >>= 1;
        }
    }
    io.send(&buf)?;
    let mut resp = vec![0u8; buf.len()];
    io.recv(&mut resp)?;

    let mut pos = 0usize;
    let mut res: u32 = 0;
    for i in 0..16u32 {
        pos += 1; // skip the falling-clock-edge byte of the pair
        if io.sample_sdi(&resp, pos) {
            res |= 1 << i;
        }
        pos += 1;
    }
    Ok(res)
}

/// Parse a 16-bit sampled window into the TPI byte it carries, per
/// `ft245r_tpi_rx`'s decode half: scan past leading idle-high bits for the
/// start bit, pull 8 data bits LSB first, then verify parity and the two
/// stop bits.
fn decode_frame(res: u32) -> Result<u8> {
    let mut m: u32 = 0x1;
    while m & res != 0 {
        m <<= 1;
    }
    if m >= 0x10 {
        return Err(Ft245rError::protocol(format!("start bit missing (res=0x{res:04x})")));
    }

    let mut byte = 0u8;
    let mut parity = false;
    for i in 0..8 {
        m <<= 1;
        let bit = (res & m) != 0;
        parity ^= bit;
        if bit {
            byte |= 1 << i;
        }
    }

    m <<= 1;
    if ((res & m) != 0) != parity {
        return Err(Ft245rError::protocol("parity bit wrong".to_string()));
    }
    if (res & (m << 1)) == 0 || (res & (m << 2)) == 0 {
        return Err(Ft245rError::protocol("stop bits wrong".to_string()));
    }
    Ok(byte)
}

/// Receive one TPI byte (`ft245r_tpi_rx`).
pub fn tpi_rx<T: FtdiTransport>(io: &mut Io<T>) -> Result<u8> {
    let res = sample_window(io)?;
    decode_frame(res)
}

/// Send `cmd` and collect `res_len` reply bytes (`ft245r_cmd_tpi`).
pub fn cmd_tpi<T: FtdiTransport>(io: &mut Io<T>, cmd: &[u8], res_len: usize) -> Result<Vec<u8>> {
    for &byte in cmd {
        tpi_tx(io, byte)?;
    }
    let mut res = Vec::with_capacity(res_len);
    for _ in 0..res_len {
        res.push(tpi_rx(io)?);
    }
    log::debug!("cmd_tpi: {cmd:02x?} -> {res:02x?}");
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::{LogicalPin, PinDef, PinMap};
    use crate::testutil::{encode_tpi_window, MockTransport, ScriptedTransport};

    fn tpi_pins() -> PinMap {
        let mut m = PinMap::new();
        m.set(LogicalPin::Sck, PinDef::new(0x01, false));
        m.set(LogicalPin::Sdo, PinDef::new(0x02, false));
        m.set(LogicalPin::Sdi, PinDef::new(0x02, false));
        m.set(LogicalPin::Reset, PinDef::new(0x04, false));
        m
    }

    #[test]
    fn decode_frame_recovers_tpiir_value() {
        // start=0 at bit0, data bits d0..d6=0, d7=1, parity=1, both stop
        // bits 1, and the remaining high bits represent pre-frame idle.
        let res = 0xFF00u32;
        assert_eq!(decode_frame(res).unwrap(), TPI_IDENT);
    }

    #[test]
    fn decode_frame_rejects_missing_start_bit() {
        assert!(decode_frame(0xFFFF).is_err());
    }

    #[test]
    fn decode_frame_rejects_bad_parity() {
        let res = 0xFF00u32 & !(1 << 9); // clear the parity bit
        assert!(decode_frame(res).is_err());
    }

    #[test]
    fn decode_frame_rejects_bad_stop_bits() {
        let res = 0xFF00u32 & !(1 << 10); // clear the first stop bit
        assert!(decode_frame(res).is_err());
    }

    #[test]
    fn tpi_rx_decodes_a_scripted_window_from_encode_tpi_window() {
        // Builds the exact 32-byte raw window `sample_window` reads, rather
        // than relying on a wired loopback -- exercises `encode_tpi_window`
        // against `tpi_rx` end to end, independent of the `Programmer`
        // session's discard-byte accounting.
        let pins = tpi_pins();
        let script = encode_tpi_window(&pins, 0xFF00);
        let mut io = Io::new(ScriptedTransport::new(script), pins, 1);
        assert_eq!(tpi_rx(&mut io).unwrap(), TPI_IDENT);
    }

    #[test]
    fn tpi_tx_emits_eleven_bit_times() {
        let mut io = Io::new(MockTransport::looping_back(), tpi_pins(), 1);
        tpi_tx(&mut io, 0x55).unwrap();
        // 1 start + 8 data + 1 parity + 2 stop = 11 bit-times, 2 bus bytes each.
        assert_eq!(io.transport().write_log_len(), 22);
    }

    #[test]
    fn sample_window_reads_exactly_32_bus_bytes() {
        let mut io = Io::new(MockTransport::looping_back(), tpi_pins(), 1);
        let _ = sample_window(&mut io).unwrap();
        assert_eq!(io.transport().write_log_len(), 32);
    }

    proptest::proptest! {
        // Any byte, framed as start/8-data-LSB-first/parity/2-stop at any of
        // the four start offsets the hunter searches, decodes back to itself.
        #[test]
        fn decode_frame_recovers_any_byte_at_any_start_offset(byte: u8, start in 0u32..4) {
            let mut res: u32 = 0;
            for b in 0..start {
                res |= 1 << b; // idle-high bits the hunter must skip past
            }
            let mut parity = false;
            for i in 0..8u32 {
                let set = (byte & (1 << i)) != 0;
                if set {
                    res |= 1 << (start + 1 + i);
                }
                parity ^= set;
            }
            if parity {
                res |= 1 << (start + 9);
            }
            res |= 1 << (start + 10); // stop 1
            res |= 1 << (start + 11); // stop 2
            proptest::prop_assert_eq!(decode_frame(res).unwrap(), byte);
        }
    }
}
