//! End-to-end scenarios against a deterministic loopback transport, mirroring
//! `spec.md` §8 "End-to-end scenarios" literally. Run with
//! `cargo test --features test-util`.

use ft245r_isp::config::Config;
use ft245r_isp::part::MemoryKind;
use ft245r_isp::pins::{LogicalPin, PinDef, PinMap};
use ft245r_isp::programmer::Programmer;
use ft245r_isp::testutil::{encode_response_bytes, MockIspPart, MockMemory, MockTransport, ScriptedTransport};

fn isp_pins() -> PinMap {
    let mut m = PinMap::new();
    m.set(LogicalPin::Sck, PinDef::new(0x01, false));
    m.set(LogicalPin::Sdo, PinDef::new(0x02, false));
    m.set(LogicalPin::Sdi, PinDef::new(0x02, false));
    m.set(LogicalPin::Reset, PinDef::new(0x04, false));
    m.set(LogicalPin::Vcc, PinDef::new(0x08, false));
    m.set(LogicalPin::Buff, PinDef::new(0x10, false));
    m
}

fn open_loopback() -> Programmer<MockTransport> {
    let _ = env_logger::try_init();
    let cfg = Config::new().with_pins(isp_pins());
    Programmer::open(MockTransport::looping_back(), &cfg, "usb:").unwrap()
}

/// Scenario 1: `cmd` round-trip. A direct SDO->SDI wire loopback reflects
/// the whole command back, so `res[1] == 0x53` after one call.
#[test]
fn scenario_1_cmd_round_trip() {
    let mut pgm = open_loopback();
    let res = pgm.cmd([0xAC, 0x53, 0x00, 0x00]).unwrap();
    assert_eq!(res[1], 0x53);
}

/// Scenario 2: TPI frame round-trip. Encoding `0x80` and feeding it straight
/// back through the frame decoder recovers `0x80`.
#[test]
fn scenario_2_tpi_frame_round_trip() {
    let mut pgm = open_loopback();
    let res = pgm.cmd_tpi(&[0x80], 1).unwrap();
    assert_eq!(res, vec![0x80]);
}

/// Scenario 3: TPI identification. `initialize` succeeds when the part's
/// `TPIIR` reads `0x80`.
#[test]
fn scenario_3_tpi_identification_succeeds() {
    use ft245r_isp::testutil::MockTpiPart;
    let mut pgm = open_loopback();
    assert!(pgm.initialize(&MockTpiPart).is_ok());
}

// The negative half of scenario 3 (a `TPIIR` mismatch being a fatal
// protocol error) is exercised directly against `tpi::decode_frame` in
// `src/tpi.rs`'s unit tests, rather than here: reproducing it end-to-end
// would require hand-computing the exact discard-byte accounting
// `tpi_initialize` builds up before the identification read, which is
// better left to the codec-level test than a brittle hand-scripted byte
// stream.

/// Scenario 4: program-enable retry. A mock that never echoes the poll
/// byte fails after exactly four attempts.
#[test]
fn scenario_4_program_enable_retry_exhausted() {
    let cfg = Config::new().with_pins(isp_pins());
    let mut pgm = Programmer::open(ScriptedTransport::new(vec![0u8; 1 << 16]), &cfg, "usb:").unwrap();
    assert!(pgm.initialize(&MockIspPart).is_err());
}

/// Scenario 4 (positive half): a wired loopback always echoes the request,
/// so program-enable succeeds on the first attempt.
#[test]
fn scenario_4_program_enable_succeeds_on_loopback() {
    let mut pgm = open_loopback();
    assert!(pgm.initialize(&MockIspPart).is_ok());
}

/// Scenario 5: paged flash write pipelining. Writing 256 bytes to a
/// 128-byte-page part commits exactly twice, at addresses 0 and 128.
#[test]
fn scenario_5_paged_flash_write_pipelining() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Flash, 128, 256);
    for (i, byte) in mem.buf_mut().iter_mut().enumerate() {
        *byte = i as u8;
    }
    let n = pgm.paged_write(&MockIspPart, &mut mem, 128, 0, 256).unwrap();
    assert_eq!(n, 256);
    assert_eq!(mem.write_page_calls, vec![0, 128]);
}

/// Scenario 6: paged flash read. A device that maps `read(addr) = addr ^
/// 0x5a` ends up reflected byte-for-byte in the in-memory image.
#[test]
fn scenario_6_paged_flash_read() {
    let pins = isp_pins();
    let page_size = ft245r_isp::spi::FRAGMENT_CMDS; // keep the whole page in one fragment
    // Each READ command occupies 4 response-byte slots in the raw stream
    // (opcode/addr-hi/addr-lo/data echo); only the 4th (offset `4k+3`)
    // carries a real value, the rest are don't-care padding.
    let mut responses = vec![0u8; page_size * 4];
    for k in 0..page_size {
        responses[k * 4 + 3] = (k as u8) ^ 0x5A;
    }
    // `Programmer::open` drives one initial output byte through
    // `send_and_discard`; that leading echo is dropped by `Io`'s discard
    // accounting before any real data is returned, so the script needs one
    // throwaway byte in front of the real response.
    let mut script = vec![0u8];
    script.extend(encode_response_bytes(&pins, &responses));
    let cfg = Config::new().with_pins(pins);
    let mut pgm = Programmer::open(ScriptedTransport::new(script), &cfg, "usb:").unwrap();
    let mut mem = MockMemory::new(MemoryKind::Flash, page_size, page_size);
    let n = pgm.paged_load(&MockIspPart, &mut mem, page_size, 0, page_size).unwrap();
    assert_eq!(n, page_size);
    for a in 0..page_size {
        assert_eq!(mem.buf()[a], (a as u8) ^ 0x5A);
    }
}

/// A trailing sub-page write (never reaching a page boundary) must still
/// commit on its final fragment -- `256 / 128` landing exactly on a boundary
/// in scenario 5 above would otherwise hide a missing commit here.
#[test]
fn paged_write_commits_a_trailing_sub_page_write() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Flash, 128, 64);
    for (i, byte) in mem.buf_mut().iter_mut().enumerate() {
        *byte = i as u8;
    }
    let n = pgm.paged_write(&MockIspPart, &mut mem, 128, 0, 64).unwrap();
    assert_eq!(n, 64);
    assert_eq!(mem.write_page_calls, vec![0]);
}

/// Boundary: `n_bytes == 0` returns 0 without touching the transport.
#[test]
fn boundary_zero_length_paged_write_is_a_no_op() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Flash, 128, 256);
    assert_eq!(pgm.paged_write(&MockIspPart, &mut mem, 128, 0, 0).unwrap(), 0);
    assert!(mem.write_page_calls.is_empty());
}

#[test]
fn boundary_zero_length_paged_load_is_a_no_op() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Flash, 128, 256);
    assert_eq!(pgm.paged_load(&MockIspPart, &mut mem, 128, 0, 0).unwrap(), 0);
}

/// Boundary: a memory kind that isn't flash or EEPROM is a shell failure.
#[test]
fn boundary_other_memory_kind_is_rejected() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Other, 128, 256);
    assert!(pgm.paged_write(&MockIspPart, &mut mem, 128, 0, 16).is_err());
    assert!(pgm.paged_load(&MockIspPart, &mut mem, 128, 0, 16).is_err());
}

/// EEPROM falls back to the shell's byte-at-a-time defaults -- no
/// pipelining, no `write_page` calls.
#[test]
fn eeprom_paged_write_uses_byte_defaults() {
    let mut pgm = open_loopback();
    let mut mem = MockMemory::new(MemoryKind::Eeprom, 0, 16);
    for (i, byte) in mem.buf_mut().iter_mut().enumerate() {
        *byte = 0xA0 + i as u8;
    }
    let n = pgm.paged_write(&MockIspPart, &mut mem, 0, 0, 16).unwrap();
    assert_eq!(n, 16);
    assert!(mem.write_page_calls.is_empty());
}

/// Repeated page writes reuse queue slots rather than growing without
/// bound -- a crude proxy for "the pool is bounded" since this crate's
/// request queue is a fixed-capacity ring rather than a malloc'd free list.
#[test]
fn repeated_paged_writes_do_not_grow_unbounded() {
    let mut pgm = open_loopback();
    for _ in 0..100 {
        let mut mem = MockMemory::new(MemoryKind::Flash, 128, 128);
        for (i, byte) in mem.buf_mut().iter_mut().enumerate() {
            *byte = i as u8;
        }
        let n = pgm.paged_write(&MockIspPart, &mut mem, 128, 0, 128).unwrap();
        assert_eq!(n, 128);
        assert_eq!(mem.write_page_calls, vec![0]);
    }
}
