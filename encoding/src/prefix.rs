//! The field prefix byte.
//!
//! Every field starts with a single byte laying out, from most to least
//! significant bit: a fixed-width flag, an ordinal-present flag, a
//! name-present flag, a two-bit code for the width of the payload length
//! field, and three reserved bits. A zero width code means the payload
//! width is implicit in the wire type.

use snafu::Snafu;

const FIXED_WIDTH_MASK: u8 = 0x80;
const ORDINAL_MASK: u8 = 0x40;
const NAME_MASK: u8 = 0x20;
const VAR_WIDTH_SHIFT: u32 = 3;
const VAR_WIDTH_MASK: u8 = 0x18;

/// An error raised when a payload length does not fit any length field.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("payload of {length} bytes exceeds the widest length field"))]
pub struct VarWidthError {
    /// The offending payload length.
    pub length: u64,
}

/// The decoded form of a field prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPrefix {
    /// Whether the payload width is implicit in the wire type.
    pub fixed_width: bool,
    /// Whether a 16-bit ordinal follows the type identifier.
    pub has_ordinal: bool,
    /// Whether a length-prefixed name follows.
    pub has_name: bool,
    /// The width of the payload length field in bytes: 0, 1, 2 or 4.
    /// Zero means the payload width is implicit in the wire type.
    pub var_width: u8,
}

impl FieldPrefix {
    /// Decode a prefix byte. The reserved low bits are ignored.
    pub fn from_byte(b: u8) -> Self {
        FieldPrefix {
            fixed_width: b & FIXED_WIDTH_MASK != 0,
            has_ordinal: b & ORDINAL_MASK != 0,
            has_name: b & NAME_MASK != 0,
            var_width: match (b & VAR_WIDTH_MASK) >> VAR_WIDTH_SHIFT {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            },
        }
    }

    /// Encode the prefix byte.
    pub fn to_byte(self) -> u8 {
        let code: u8 = match self.var_width {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 3,
        };
        (if self.fixed_width { FIXED_WIDTH_MASK } else { 0 })
            | (if self.has_ordinal { ORDINAL_MASK } else { 0 })
            | (if self.has_name { NAME_MASK } else { 0 })
            | (code << VAR_WIDTH_SHIFT)
    }

    /// Whether the payload width comes from the wire type rather than the
    /// wire. A set fixed-width flag and a zero width code are equivalent.
    #[inline]
    pub fn implicit_width(&self) -> bool {
        self.fixed_width || self.var_width == 0
    }
}

/// The smallest payload length field width able to carry `length`.
pub fn var_width_for(length: u64) -> Result<u8, VarWidthError> {
    if length <= u64::from(u8::MAX) {
        Ok(1)
    } else if length <= u64::from(u16::MAX) {
        Ok(2)
    } else if length <= u64::from(u32::MAX) {
        Ok(4)
    } else {
        VarWidthSnafu { length }.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_round_trip() {
        for byte in [0x00, 0x40, 0x20, 0x60, 0x08, 0x10, 0x18, 0x68, 0xD8] {
            let prefix = FieldPrefix::from_byte(byte);
            assert_eq!(prefix.to_byte(), byte, "byte {byte:#04x}");
        }
    }

    #[test]
    fn reserved_bits_are_ignored() {
        let prefix = FieldPrefix::from_byte(0x47);
        assert_eq!(prefix.to_byte(), 0x40);
    }

    #[test]
    fn ordinal_only_fixed_width_field_is_0x40() {
        let prefix = FieldPrefix {
            fixed_width: false,
            has_ordinal: true,
            has_name: false,
            var_width: 0,
        };
        assert_eq!(prefix.to_byte(), 0x40);
        assert!(prefix.implicit_width());
    }

    #[test]
    fn width_selection() {
        assert_eq!(var_width_for(0).unwrap(), 1);
        assert_eq!(var_width_for(255).unwrap(), 1);
        assert_eq!(var_width_for(256).unwrap(), 2);
        assert_eq!(var_width_for(65535).unwrap(), 2);
        assert_eq!(var_width_for(65536).unwrap(), 4);
        assert!(var_width_for(1 << 40).is_err());
    }
}
