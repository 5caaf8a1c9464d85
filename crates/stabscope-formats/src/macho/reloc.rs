//! Mach-O relocation entry parsing.
//!
//! A `relocation_info` is eight bytes: a 32-bit address followed by a
//! 32-bit word packing `r_symbolnum:24, r_pcrel:1, r_length:2, r_extern:1,
//! r_type:4`. Bitfield packing follows the byte order of the file, so the
//! 24-bit symbol number sits in the low bits on i386 and the high bits on
//! PowerPC.

use crate::{Endian, ExternalRelocation, ParseError};

/// Size of a relocation entry.
pub const RELOCATION_INFO_SIZE: usize = 8;

/// A decoded `relocation_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationInfo {
    /// Address the relocation applies to.
    pub r_address: u32,
    /// Symbol (external) or section (local) ordinal.
    pub r_symbolnum: u32,
    /// PC-relative relocation.
    pub r_pcrel: bool,
    /// log2 of the relocated width in bytes.
    pub r_length: u8,
    /// Relocation refers to a symbol table entry.
    pub r_extern: bool,
    /// Architecture-specific relocation type.
    pub r_type: u8,
}

impl RelocationInfo {
    /// Parses one relocation entry.
    pub fn parse(data: &[u8], endian: Endian) -> Result<Self, ParseError> {
        if data.len() < RELOCATION_INFO_SIZE {
            return Err(ParseError::truncated(
                "relocation entry",
                RELOCATION_INFO_SIZE,
                data.len(),
            ));
        }

        let r_address = endian.read_u32(&data[0..]);
        let packed = endian.read_u32(&data[4..]);

        let (r_symbolnum, r_pcrel, r_length, r_extern, r_type) = match endian {
            Endian::Little => (
                packed & 0x00FF_FFFF,
                (packed >> 24) & 1 != 0,
                ((packed >> 25) & 3) as u8,
                (packed >> 27) & 1 != 0,
                ((packed >> 28) & 0xF) as u8,
            ),
            Endian::Big => (
                packed >> 8,
                (packed >> 7) & 1 != 0,
                ((packed >> 5) & 3) as u8,
                (packed >> 4) & 1 != 0,
                (packed & 0xF) as u8,
            ),
        };

        Ok(Self {
            r_address,
            r_symbolnum,
            r_pcrel,
            r_length,
            r_extern,
            r_type,
        })
    }

    /// Converts to the facade record.
    pub fn to_external(&self) -> ExternalRelocation {
        ExternalRelocation {
            address: u64::from(self.r_address),
            symbol_num: self.r_symbolnum,
            is_pcrel: self.r_pcrel,
            length: self.r_length,
            kind: self.r_type,
        }
    }
}
