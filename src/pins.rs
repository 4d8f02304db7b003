//! Pin descriptor & bit encoder (component A).
//!
//! Each logical pin used by the programmer maps to a bit mask over the
//! FTDI chip's 8-bit synchronous bit-bang port, plus an inversion flag. Only
//! the low 8 bits are ever addressed (`spec.md` §3).

/// The logical pins the driver knows about. `Buff` is optional; the rest of
/// the non-LED pins are mandatory at `open` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPin {
    Sck,
    Sdo,
    Sdi,
    Reset,
    Vcc,
    Buff,
    LedRdy,
    LedErr,
    LedPgm,
    LedVfy,
}

impl LogicalPin {
    pub const ALL: [LogicalPin; 10] = [
        LogicalPin::Sck,
        LogicalPin::Sdo,
        LogicalPin::Sdi,
        LogicalPin::Reset,
        LogicalPin::Vcc,
        LogicalPin::Buff,
        LogicalPin::LedRdy,
        LogicalPin::LedErr,
        LogicalPin::LedPgm,
        LogicalPin::LedVfy,
    ];

    /// Pins that must have a non-zero mask before `open` is allowed to
    /// proceed (`ft245r_open`'s `pin_checklist`; `Buff` is excluded).
    pub const MANDATORY: [LogicalPin; 4] =
        [LogicalPin::Sck, LogicalPin::Sdo, LogicalPin::Sdi, LogicalPin::Reset];

    fn name(self) -> &'static str {
        match self {
            LogicalPin::Sck => "SCK",
            LogicalPin::Sdo => "SDO",
            LogicalPin::Sdi => "SDI",
            LogicalPin::Reset => "RESET",
            LogicalPin::Vcc => "VCC",
            LogicalPin::Buff => "BUFF",
            LogicalPin::LedRdy => "LED_RDY",
            LogicalPin::LedErr => "LED_ERR",
            LogicalPin::LedPgm => "LED_PGM",
            LogicalPin::LedVfy => "LED_VFY",
        }
    }
}

/// A single pin's byte mask and inversion flag, mirroring `pgm->pin[...]`
/// in the original source (`mask[0]` plus an inversion bit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinDef {
    pub mask: u8,
    pub invert: bool,
}

impl PinDef {
    pub fn new(mask: u8, invert: bool) -> Self { PinDef { mask, invert } }

    fn is_defined(self) -> bool { self.mask != 0 }
}

/// The full set of logical-pin-to-byte-mask assignments, supplied by the
/// part/shell side (the "pin descriptor" of `spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct PinMap {
    defs: [PinDef; LogicalPin::ALL.len()],
}

fn index_of(pin: LogicalPin) -> usize { LogicalPin::ALL.iter().position(|p| *p == pin).unwrap() }

impl PinMap {
    pub fn new() -> Self { PinMap::default() }

    pub fn set(&mut self, pin: LogicalPin, def: PinDef) -> &mut Self {
        self.defs[index_of(pin)] = def;
        self
    }

    pub fn get(&self, pin: LogicalPin) -> PinDef { self.defs[index_of(pin)] }

    /// `ddr` is the OR of the masks of every *output* pin. `Sdi` is
    /// deliberately excluded: it's the host-input line, and programming it
    /// as an output would make it impossible to sample the AVR's MISO data
    /// (`spec.md` §3/§4.H; `ft245r_open`'s own `ddr` OR skips `SDI`).
    pub fn data_direction(&self) -> u8 {
        LogicalPin::ALL
            .iter()
            .filter(|&&pin| pin != LogicalPin::Sdi)
            .fold(0u8, |acc, &pin| acc | self.get(pin).mask)
    }

    /// Validate that every mandatory pin has a non-zero mask. Returns the
    /// name of the first missing pin, if any.
    pub fn missing_mandatory(&self) -> Option<&'static str> {
        LogicalPin::MANDATORY.iter().find(|&&pin| !self.get(pin).is_defined()).map(|&pin| pin.name())
    }

    /// Set or clear a logical pin's bit within `byte`, honoring inversion.
    /// Pins with a zero mask are left untouched (they're simply not wired).
    pub fn set_bit(&self, byte: u8, pin: LogicalPin, value: bool) -> u8 {
        let def = self.get(pin);
        if def.mask == 0 {
            return byte;
        }
        let asserted = value != def.invert;
        if asserted { byte | def.mask } else { byte & !def.mask }
    }

    /// Read a logical pin's bit out of `byte`, honoring inversion.
    pub fn get_bit(&self, byte: u8, pin: LogicalPin) -> bool {
        let def = self.get(pin);
        let raw = def.mask != 0 && (byte & def.mask) != 0;
        raw != def.invert
    }

    /// One line per logical pin: its byte mask and whether it's inverted.
    /// The Rust analogue of `ft245r_display`.
    pub fn describe(&self) -> String {
        let mut out = String::from("Pin assignment        : 0..7 = DBUS0..7\n");
        for &pin in LogicalPin::ALL.iter() {
            let def = self.get(pin);
            out.push_str(&format!(
                "  {:<8} mask=0x{:02x}{}\n",
                pin.name(),
                def.mask,
                if def.invert { " (inverted)" } else { "" }
            ));
        }
        out
    }
}
