//! Mach-O symbol table parsing (32-bit nlist).

use crate::{Endian, ParseError, SymbolRecord};

/// Size of a 32-bit nlist entry.
pub const NLIST_SIZE: usize = 12;

// n_type masks
pub const N_STAB: u8 = 0xE0; // any of these bits set: debugging symbol
pub const N_PEXT: u8 = 0x10; // private external
pub const N_TYPE: u8 = 0x0E; // type mask
pub const N_EXT: u8 = 0x01; // external

/// A 32-bit Mach-O symbol table entry.
#[derive(Debug, Clone)]
pub struct Nlist {
    /// Index into the string table.
    pub n_strx: u32,
    /// Type and binding info.
    pub n_type: u8,
    /// Section ordinal, 1-based.
    pub n_sect: u8,
    /// Description; stab records give it meaning.
    pub n_desc: u16,
    /// Symbol value.
    pub n_value: u32,
}

impl Nlist {
    /// Parses one 32-bit nlist entry.
    pub fn parse(data: &[u8], endian: Endian) -> Result<Self, ParseError> {
        if data.len() < NLIST_SIZE {
            return Err(ParseError::truncated("nlist entry", NLIST_SIZE, data.len()));
        }
        Ok(Self {
            n_strx: endian.read_u32(&data[0..]),
            n_type: data[4],
            n_sect: data[5],
            n_desc: endian.read_u16(&data[6..]),
            n_value: endian.read_u32(&data[8..]),
        })
    }

    /// Returns true if this is a debugging (stab) symbol.
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    /// Resolves the name from the string table and builds the facade record.
    pub fn to_record(&self, strtab: &[u8]) -> SymbolRecord {
        let name = if (self.n_strx as usize) < strtab.len() {
            let bytes = &strtab[self.n_strx as usize..];
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).to_string()
        } else {
            String::new()
        };

        SymbolRecord {
            name,
            raw_type: self.n_type,
            section: self.n_sect,
            desc: self.n_desc,
            value: u64::from(self.n_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nlist() {
        let mut data = vec![0u8; NLIST_SIZE];
        data[0..4].copy_from_slice(&5u32.to_le_bytes()); // n_strx
        data[4] = 0x24; // N_FUN
        data[5] = 1;
        data[6..8].copy_from_slice(&42u16.to_le_bytes());
        data[8..12].copy_from_slice(&0x1f00u32.to_le_bytes());

        let nlist = Nlist::parse(&data, Endian::Little).unwrap();
        assert_eq!(nlist.n_strx, 5);
        assert_eq!(nlist.n_type, 0x24);
        assert!(nlist.is_stab());
        assert_eq!(nlist.n_desc, 42);
        assert_eq!(nlist.n_value, 0x1f00);

        let strtab = b"\0abc\0_main\0";
        let record = nlist.to_record(strtab);
        assert_eq!(record.name, "_main");
        assert_eq!(record.value, 0x1f00);
    }

    #[test]
    fn test_stab_detection() {
        let nlist = Nlist {
            n_strx: 0,
            n_type: 0x1e, // N_PEXT | N_SECT: not a stab
            n_sect: 1,
            n_desc: 0,
            n_value: 0,
        };
        assert!(!nlist.is_stab());

        let nlist = Nlist {
            n_type: 0x64, // N_SO
            ..nlist
        };
        assert!(nlist.is_stab());
    }
}
