//! TX batch buffer and RX ring buffer (component B).
//!
//! Neither structure ever reallocates: the TX batch is a fixed `FIFO_MIN`
//! array that the caller is expected to flush whenever it fills, and the RX
//! ring is a fixed power-of-two `RX_CAP` array with wrapping head/tail
//! indices (`spec.md` §4.B).

/// Matches the FTDI chip's own RX/TX FIFO size in synchronous bit-bang mode.
pub const FIFO_MIN: usize = 128;

/// Generous relative to the device's own 128-byte FIFO; a power of two so
/// index wraparound is a mask instead of a modulo (`spec.md` §9).
pub const RX_CAP: usize = 8192;

/// A fixed-capacity staging buffer for outgoing bytes, auto-flushed by the
/// caller once it reaches [`FIFO_MIN`].
#[derive(Debug)]
pub struct TxBatch {
    buf: [u8; FIFO_MIN],
    len: usize,
}

impl Default for TxBatch {
    fn default() -> Self { TxBatch { buf: [0u8; FIFO_MIN], len: 0 } }
}

impl TxBatch {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn is_full(&self) -> bool { self.len >= FIFO_MIN }

    /// Append one byte to the batch. Returns `true` if the batch is now
    /// full and must be flushed before any more bytes can be appended.
    pub fn push(&mut self, byte: u8) -> bool {
        debug_assert!(self.len < FIFO_MIN, "TxBatch::push called on a full batch");
        self.buf[self.len] = byte;
        self.len += 1;
        self.is_full()
    }

    pub fn as_slice(&self) -> &[u8] { &self.buf[..self.len] }

    pub fn clear(&mut self) { self.len = 0; }
}

/// A fixed-capacity ring buffer of sampled bytes read back from the device.
#[derive(Debug)]
pub struct RxRing {
    buf: Vec<u8>,
    rd: usize,
    wr: usize,
    len: usize,
}

impl Default for RxRing {
    fn default() -> Self { RxRing { buf: vec![0u8; RX_CAP], rd: 0, wr: 0, len: 0 } }
}

impl RxRing {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn purge(&mut self) {
        self.len = 0;
        self.rd = 0;
        self.wr = 0;
    }

    pub fn put(&mut self, byte: u8) {
        debug_assert!(self.len < self.buf.len(), "RxRing overflow");
        self.buf[self.wr] = byte;
        self.wr = (self.wr + 1) % self.buf.len();
        self.len += 1;
    }

    pub fn get(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.rd];
        self.rd = (self.rd + 1) % self.buf.len();
        self.len -= 1;
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_batch_reports_full_at_fifo_min() {
        let mut tx = TxBatch::new();
        for i in 0..FIFO_MIN - 1 {
            assert!(!tx.push(i as u8));
        }
        assert!(tx.push(0xFF));
        assert_eq!(tx.len(), FIFO_MIN);
    }

    #[test]
    fn rx_ring_fifo_order_and_len_invariant() {
        let mut rx = RxRing::new();
        for i in 0..10u8 {
            rx.put(i);
        }
        assert_eq!(rx.len(), 10);
        for i in 0..10u8 {
            assert_eq!(rx.get(), Some(i));
        }
        assert_eq!(rx.get(), None);
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn rx_ring_wraps_around_capacity() {
        let mut rx = RxRing::new();
        // Fill and drain repeatedly so wr/rd both wrap several times.
        for round in 0..3 {
            for i in 0..RX_CAP {
                rx.put(((round * 7 + i) % 256) as u8);
            }
            assert_eq!(rx.len(), RX_CAP);
            for i in 0..RX_CAP {
                assert_eq!(rx.get(), Some(((round * 7 + i) % 256) as u8));
            }
            assert_eq!(rx.len(), 0);
        }
    }

    proptest::proptest! {
        #[test]
        fn rx_ring_preserves_fifo_order_for_any_batch(
            bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..=RX_CAP)
        ) {
            let mut rx = RxRing::new();
            for &b in &bytes {
                rx.put(b);
            }
            proptest::prop_assert_eq!(rx.len(), bytes.len());
            for &b in &bytes {
                proptest::prop_assert_eq!(rx.get(), Some(b));
            }
            proptest::prop_assert_eq!(rx.get(), None);
        }
    }
}
