//! Configuration knobs consumed at `open` time (`spec.md` §6).
//!
//! Parsing command-line flags into these knobs is the caller's job (out of
//! scope per `spec.md` §1); this module only owns what the driver does with
//! them once they're in hand: the port-string grammar, USB vid/pid/product/
//! serial selection, and bit-clock arithmetic.

use crate::error::{Ft245rError, Result};
use crate::pins::PinMap;

/// FTDI's own default vendor ID.
pub const USB_VENDOR_FTDI: u16 = 0x0403;
/// Default product ID used when the caller's PID list is empty.
pub const USB_DEVICE_FT245: u16 = 0x6001;

/// libftdi multiplies the bit-bang baud setting by 4 internally; this is
/// the maximum programmable rate (3 MHz / 4).
pub const FTDI_MAX_BAUD_SETTING: u32 = 750_000;

/// Some FTDI silicon revisions mis-time bit-bang output unless the bitclock
/// is pinned to the max; see `spec.md` §4.H and the errata note carried
/// over from the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseWidthMode {
    /// Program the FTDI baud rate the caller actually asked for.
    #[default]
    ExactBaud,
    /// Always program the max (3 MHz) rate and repeat each output byte
    /// `ceil(3_000_000 / desired)` times to compensate.
    Fixed3MhzRepeat,
}

/// `pgm->extra_features` in the original source. Only one flag is
/// meaningful to this crate today: whether the caller's higher-level shell
/// actually supports adjusting the bitclock (used purely to decide whether
/// setting one without it is worth a warning).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtraFeatures {
    pub has_bitclock_adj: bool,
    /// Downgrades a TPI SDO/SDI strap-wiring mismatch at `initialize` time
    /// from a fatal protocol error to a logged warning (`spec.md` §4.E/§7).
    pub override_sdo_sdi_strap_check: bool,
}

/// Parsed form of the `usb:...` port string (`spec.md` §6 port grammar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// `usb:`, `usb:ft<digits>` — 0-based index among matching devices.
    Index(u32),
    /// `usb:<8-char token>` — an FTDI serial number.
    Serial(String),
}

impl PortSpec {
    /// Parse a port string per `spec.md` §6:
    /// ```text
    /// port := "usb:" [ serial8 | "ft" digits | "" ]
    /// serial8 := any 8-char token
    /// ```
    /// Unlike the original C (`ft245r_open`), the `"ft" digits` branch
    /// requires the literal `"ft"` prefix — `spec.md` §9 flags the original
    /// condition (`strncmp("ft", device, 2) || strlen(device) <= 8`) as an
    /// inverted-sense bug that accepts almost anything as a device number.
    pub fn parse(port: &str) -> Result<PortSpec> {
        let rest = port.strip_prefix("usb:").ok_or_else(|| {
            Ft245rError::configuration(format!("invalid port name {port}: use ft[0-9]+ or serial number"))
        })?;

        if rest.is_empty() {
            return Ok(PortSpec::Index(0));
        }
        if rest.len() == 8 {
            return Ok(PortSpec::Serial(rest.to_string()));
        }
        if let Some(digits) = rest.strip_prefix("ft") {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(idx) = digits.parse::<u32>() {
                    return Ok(PortSpec::Index(idx));
                }
            }
        }
        Err(Ft245rError::configuration(format!("invalid port name {port}: use ft[0-9]+ or serial number")))
    }
}

/// All of the knobs the driver needs at `open` time.
#[derive(Debug, Clone)]
pub struct Config {
    pub baudrate: Option<u32>,
    /// Bit clock period, in seconds, if the caller specified one directly
    /// (mirrors avrdude's `-B` flag; takes precedence over `baudrate`).
    pub bitclock_period_secs: Option<f64>,
    pub pulse_width_mode: PulseWidthMode,
    pub extra_features: ExtraFeatures,
    pub usb_vid: Option<u16>,
    /// Caller-supplied candidate PIDs, tried in order; only the first is
    /// ever used (a warning is logged if more than one was supplied).
    pub usb_pid: Vec<u16>,
    pub usb_product: Option<String>,
    pub pins: PinMap,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            baudrate: None,
            bitclock_period_secs: None,
            pulse_width_mode: PulseWidthMode::ExactBaud,
            extra_features: ExtraFeatures::default(),
            usb_vid: None,
            usb_pid: Vec::new(),
            usb_product: None,
            pins: PinMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self { Self::default() }

    pub fn with_pins(mut self, pins: PinMap) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_baudrate(mut self, hz: u32) -> Self {
        self.baudrate = Some(hz);
        self
    }

    pub fn with_bitclock_period_secs(mut self, secs: f64) -> Self {
        self.bitclock_period_secs = Some(secs);
        self
    }

    pub fn with_pulse_width_mode(mut self, mode: PulseWidthMode) -> Self {
        self.pulse_width_mode = mode;
        self
    }

    pub fn vendor_id(&self) -> u16 { self.usb_vid.unwrap_or(USB_VENDOR_FTDI) }

    /// The product ID actually used: the first of `usb_pid` if any were
    /// given (with a warning if there were more), else [`USB_DEVICE_FT245`].
    pub fn product_id(&self) -> u16 {
        match self.usb_pid.as_slice() {
            [] => USB_DEVICE_FT245,
            [only] => *only,
            [first, ..] => {
                log::warn!("using PID {first:#06x}, ignoring remaining PIDs in list");
                *first
            }
        }
    }

    /// Requested effective rate in Hz: `1/bitclock` if given, else
    /// `baudrate`, else 150_000 (works for every FTDI chip at the
    /// internal 1 MHz clock, per `spec.md` §4.H).
    fn requested_rate_hz(&self) -> u32 {
        if let (Some(bc), Some(baud)) = (self.bitclock_period_secs, self.baudrate) {
            if (1.0 / bc).round() as i64 != baud as i64 {
                log::warn!("both baudrate and bitclock set; using bitclock");
            }
        }
        if self.baudrate.is_some() || self.bitclock_period_secs.is_some() {
            if !self.extra_features.has_bitclock_adj {
                log::warn!("setting bitclock despite HAS_BITCLOCK_ADJ missing in extra_features");
            }
        }
        self.bitclock_period_secs
            .map(|secs| (1.0 / secs).round() as u32)
            .or(self.baudrate)
            .unwrap_or(150_000)
    }

    /// Resolve the requested rate into `(ftdi_programmed_baud,
    /// baud_multiplier)`, per `spec.md` §4.H. When
    /// [`PulseWidthMode::Fixed3MhzRepeat`] is active, the programmed baud is
    /// pinned at [`FTDI_MAX_BAUD_SETTING`] and every output byte must be
    /// repeated `baud_multiplier` times to compensate.
    pub fn resolve_bitclock(&self) -> (u32, u32) {
        let rate = self.requested_rate_hz();
        match self.pulse_width_mode {
            PulseWidthMode::ExactBaud => (rate, 1),
            PulseWidthMode::Fixed3MhzRepeat => {
                let mult = if rate > 0 && rate < FTDI_MAX_BAUD_SETTING {
                    ((FTDI_MAX_BAUD_SETTING as u64 + rate as u64 - 1) / rate as u64) as u32
                } else {
                    1
                };
                (FTDI_MAX_BAUD_SETTING, mult)
            }
        }
    }
}
