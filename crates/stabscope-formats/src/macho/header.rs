//! Mach-O header parsing.

use crate::{Endian, ParseError};

// Magic numbers, as read in little-endian order.
pub const MH_MAGIC: u32 = 0xFEEDFACE; // 32-bit, little-endian file
pub const MH_CIGAM: u32 = 0xCEFAEDFE; // 32-bit, big-endian file
pub const MH_MAGIC_64: u32 = 0xFEEDFACF; // 64-bit, little-endian file
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE; // 64-bit, big-endian file
pub const FAT_MAGIC: u32 = 0xCAFEBABE; // fat header, always big-endian

// CPU types this tool cares about.
pub const CPU_TYPE_I386: u32 = 7;
pub const CPU_TYPE_POWERPC: u32 = 18;

/// Requested CPU slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
    I386,
    PowerPc,
}

impl CpuType {
    /// Raw Mach-O cputype value.
    pub fn raw(self) -> u32 {
        match self {
            CpuType::I386 => CPU_TYPE_I386,
            CpuType::PowerPc => CPU_TYPE_POWERPC,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            CpuType::I386 => "i386",
            CpuType::PowerPc => "ppc",
        }
    }
}

/// 32-bit Mach-O header.
#[derive(Debug, Clone)]
pub struct MachHeader {
    /// CPU type.
    pub cputype: u32,
    /// CPU subtype.
    pub cpusubtype: u32,
    /// File type.
    pub filetype: u32,
    /// Number of load commands.
    pub ncmds: u32,
    /// Size of all load commands.
    pub sizeofcmds: u32,
    /// Flags.
    pub flags: u32,
}

/// Size of the 32-bit header in bytes.
pub const MACH_HEADER_SIZE: usize = 28;

impl MachHeader {
    /// Parses a 32-bit Mach-O header, deciding the byte order from the
    /// magic. 64-bit magics are rejected.
    pub fn parse(data: &[u8]) -> Result<(Self, Endian), ParseError> {
        if data.len() < MACH_HEADER_SIZE {
            return Err(ParseError::truncated(
                "Mach-O header",
                MACH_HEADER_SIZE,
                data.len(),
            ));
        }

        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let endian = match magic {
            MH_MAGIC => Endian::Little,
            MH_CIGAM => Endian::Big,
            MH_MAGIC_64 | MH_CIGAM_64 => return Err(ParseError::Unsupported64Bit),
            _ => return Err(ParseError::not_macho(&data[0..4])),
        };

        Ok((
            Self {
                cputype: endian.read_u32(&data[4..]),
                cpusubtype: endian.read_u32(&data[8..]),
                filetype: endian.read_u32(&data[12..]),
                ncmds: endian.read_u32(&data[16..]),
                sizeofcmds: endian.read_u32(&data[20..]),
                flags: endian.read_u32(&data[24..]),
            },
            endian,
        ))
    }
}

/// Architecture entry in a fat binary.
#[derive(Debug, Clone)]
pub struct FatArch {
    /// CPU type.
    pub cputype: u32,
    /// CPU subtype.
    pub cpusubtype: u32,
    /// File offset to this architecture's slice.
    pub offset: u32,
    /// Size of the slice.
    pub size: u32,
}

/// Fat binary header.
#[derive(Debug)]
pub struct FatHeader {
    /// Architectures in the fat binary.
    pub architectures: Vec<FatArch>,
}

impl FatHeader {
    /// Returns true when the data starts with the fat magic.
    pub fn is_fat(data: &[u8]) -> bool {
        data.len() >= 4
            && u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == FAT_MAGIC
    }

    /// Parses a fat binary header. Fat headers are always big-endian.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 8 {
            return Err(ParseError::truncated("fat header", 8, data.len()));
        }
        if !Self::is_fat(data) {
            return Err(ParseError::not_macho(&data[0..4]));
        }

        let nfat_arch = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let mut architectures = Vec::with_capacity(nfat_arch as usize);
        let mut offset = 8;

        for _ in 0..nfat_arch {
            if offset + 20 > data.len() {
                return Err(ParseError::truncated(
                    "fat arch table",
                    offset + 20,
                    data.len(),
                ));
            }
            architectures.push(FatArch {
                cputype: Endian::Big.read_u32(&data[offset..]),
                cpusubtype: Endian::Big.read_u32(&data[offset + 4..]),
                offset: Endian::Big.read_u32(&data[offset + 8..]),
                size: Endian::Big.read_u32(&data[offset + 12..]),
            });
            offset += 20;
        }

        Ok(Self { architectures })
    }

    /// Finds the slice for a CPU type.
    pub fn slice_for(&self, cpu: CpuType) -> Option<&FatArch> {
        self.architectures.iter().find(|a| a.cputype == cpu.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_little_endian_header() {
        let mut data = vec![0u8; 28];
        data[0..4].copy_from_slice(&MH_MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&CPU_TYPE_I386.to_le_bytes());
        data[16..20].copy_from_slice(&3u32.to_le_bytes());

        let (header, endian) = MachHeader::parse(&data).unwrap();
        assert_eq!(endian, Endian::Little);
        assert_eq!(header.cputype, CPU_TYPE_I386);
        assert_eq!(header.ncmds, 3);
    }

    #[test]
    fn test_parse_big_endian_header() {
        let mut data = vec![0u8; 28];
        data[0..4].copy_from_slice(&0xFEEDFACEu32.to_be_bytes());
        data[4..8].copy_from_slice(&CPU_TYPE_POWERPC.to_be_bytes());
        data[16..20].copy_from_slice(&2u32.to_be_bytes());

        let (header, endian) = MachHeader::parse(&data).unwrap();
        assert_eq!(endian, Endian::Big);
        assert_eq!(header.cputype, CPU_TYPE_POWERPC);
        assert_eq!(header.ncmds, 2);
    }

    #[test]
    fn test_reject_64bit() {
        let mut data = vec![0u8; 32];
        data[0..4].copy_from_slice(&MH_MAGIC_64.to_le_bytes());
        assert!(matches!(
            MachHeader::parse(&data),
            Err(ParseError::Unsupported64Bit)
        ));
    }

    #[test]
    fn test_parse_fat_header() {
        let mut data = vec![0u8; 48];
        data[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&2u32.to_be_bytes());
        // ppc slice
        data[8..12].copy_from_slice(&CPU_TYPE_POWERPC.to_be_bytes());
        data[16..20].copy_from_slice(&4096u32.to_be_bytes());
        data[20..24].copy_from_slice(&1000u32.to_be_bytes());
        // i386 slice
        data[28..32].copy_from_slice(&CPU_TYPE_I386.to_be_bytes());
        data[36..40].copy_from_slice(&8192u32.to_be_bytes());
        data[40..44].copy_from_slice(&2000u32.to_be_bytes());

        let fat = FatHeader::parse(&data).unwrap();
        assert_eq!(fat.architectures.len(), 2);
        assert_eq!(fat.slice_for(CpuType::I386).unwrap().offset, 8192);
        assert_eq!(fat.slice_for(CpuType::PowerPc).unwrap().offset, 4096);
    }
}
