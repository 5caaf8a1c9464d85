//! 32-bit Mach-O binary loading.
//!
//! Handles thin and universal (fat) files. A fat file is resolved to the
//! slice matching the requested CPU type; the byte order follows the
//! slice's magic. The loaded image owns its bytes so the relocation
//! patcher can write synthetic tag words into it.

mod header;
mod reloc;
mod segment;
mod symbol;

pub use header::{CpuType, FatArch, FatHeader, MachHeader};
pub use reloc::RelocationInfo;
pub use segment::{Section, Segment};
pub use symbol::Nlist;

use crate::{BinaryImage, Endian, ExternalRelocation, ParseError, SectionRef, SymbolRecord};

// Load command types this tool consumes.
const LC_SEGMENT: u32 = 0x1;
const LC_SYMTAB: u32 = 0x2;
const LC_DYSYMTAB: u32 = 0xB;

/// A loaded 32-bit Mach-O image.
#[derive(Debug)]
pub struct MachImage {
    /// Raw bytes of the whole file; patched in place.
    data: Vec<u8>,
    /// Offset of the selected slice inside `data` (fat binaries).
    slice_offset: usize,
    /// Byte order of the slice.
    endian: Endian,
    /// Parsed header.
    pub header: MachHeader,
    /// Segments with their sections.
    pub segments: Vec<Segment>,
    /// Symbol table in on-disk order.
    symbols: Vec<SymbolRecord>,
    /// External relocation table.
    relocations: Vec<ExternalRelocation>,
}

impl MachImage {
    /// Reads and parses a Mach-O file, selecting the given CPU slice.
    pub fn load(path: &std::path::Path, cpu: CpuType) -> Result<Self, ParseError> {
        let data = std::fs::read(path)?;
        Self::parse(data, cpu)
    }

    /// Parses a Mach-O file from owned bytes.
    pub fn parse(data: Vec<u8>, cpu: CpuType) -> Result<Self, ParseError> {
        if FatHeader::is_fat(&data) {
            let fat = FatHeader::parse(&data)?;
            let arch = fat
                .slice_for(cpu)
                .ok_or(ParseError::MissingArchitecture(cpu.name()))?;
            let offset = arch.offset as usize;
            if offset >= data.len() {
                return Err(ParseError::malformed(
                    "fat arch",
                    offset as u64,
                    "slice offset beyond end of file",
                ));
            }
            Self::parse_slice(data, offset, cpu)
        } else {
            Self::parse_slice(data, 0, cpu)
        }
    }

    fn parse_slice(data: Vec<u8>, slice_offset: usize, cpu: CpuType) -> Result<Self, ParseError> {
        let slice = &data[slice_offset..];
        let (header, endian) = MachHeader::parse(slice)?;
        if header.cputype != cpu.raw() {
            return Err(ParseError::MissingArchitecture(cpu.name()));
        }

        let mut segments = Vec::new();
        let mut symtab: Option<(usize, usize, usize, usize)> = None;
        let mut extrel: Option<(usize, usize)> = None;

        let mut offset = header::MACH_HEADER_SIZE;
        for _ in 0..header.ncmds {
            if offset + 8 > slice.len() {
                return Err(ParseError::truncated(
                    "load commands",
                    offset + 8,
                    slice.len(),
                ));
            }
            let cmd = endian.read_u32(&slice[offset..]);
            let cmdsize = endian.read_u32(&slice[offset + 4..]) as usize;
            if cmdsize < 8 || offset + cmdsize > slice.len() {
                return Err(ParseError::malformed(
                    "load command",
                    offset as u64,
                    format!("command size {cmdsize} out of range"),
                ));
            }
            let cmd_data = &slice[offset..offset + cmdsize];

            match cmd {
                LC_SEGMENT => segments.push(Segment::parse(cmd_data, endian)?),
                LC_SYMTAB => {
                    if cmd_data.len() < 24 {
                        return Err(ParseError::truncated("LC_SYMTAB command", 24, cmd_data.len()));
                    }
                    symtab = Some((
                        endian.read_u32(&cmd_data[8..]) as usize,
                        endian.read_u32(&cmd_data[12..]) as usize,
                        endian.read_u32(&cmd_data[16..]) as usize,
                        endian.read_u32(&cmd_data[20..]) as usize,
                    ));
                }
                LC_DYSYMTAB => {
                    if cmd_data.len() < 80 {
                        return Err(ParseError::truncated(
                            "LC_DYSYMTAB command",
                            80,
                            cmd_data.len(),
                        ));
                    }
                    extrel = Some((
                        endian.read_u32(&cmd_data[64..]) as usize,
                        endian.read_u32(&cmd_data[68..]) as usize,
                    ));
                }
                _ => {}
            }
            offset += cmdsize;
        }

        let symbols = match symtab {
            Some((symoff, nsyms, stroff, strsize)) => {
                Self::parse_symbols(slice, symoff, nsyms, stroff, strsize, endian)?
            }
            None => Vec::new(),
        };

        let (extreloff, nextrel) = extrel.ok_or(ParseError::MissingDysymtab)?;
        let relocations = Self::parse_relocations(slice, extreloff, nextrel, endian)?;

        Ok(Self {
            data,
            slice_offset,
            endian,
            header,
            segments,
            symbols,
            relocations,
        })
    }

    fn parse_symbols(
        slice: &[u8],
        symoff: usize,
        nsyms: usize,
        stroff: usize,
        strsize: usize,
        endian: Endian,
    ) -> Result<Vec<SymbolRecord>, ParseError> {
        let str_end = stroff.saturating_add(strsize).min(slice.len());
        let strtab = if stroff < str_end {
            &slice[stroff..str_end]
        } else {
            &[][..]
        };

        let mut symbols = Vec::with_capacity(nsyms);
        for i in 0..nsyms {
            let entry_offset = symoff + i * symbol::NLIST_SIZE;
            if entry_offset + symbol::NLIST_SIZE > slice.len() {
                return Err(ParseError::truncated(
                    "symbol table",
                    entry_offset + symbol::NLIST_SIZE,
                    slice.len(),
                ));
            }
            let nlist = Nlist::parse(&slice[entry_offset..], endian)?;
            symbols.push(nlist.to_record(strtab));
        }
        Ok(symbols)
    }

    fn parse_relocations(
        slice: &[u8],
        extreloff: usize,
        nextrel: usize,
        endian: Endian,
    ) -> Result<Vec<ExternalRelocation>, ParseError> {
        let mut relocations = Vec::with_capacity(nextrel);
        for i in 0..nextrel {
            let entry_offset = extreloff + i * reloc::RELOCATION_INFO_SIZE;
            if entry_offset + reloc::RELOCATION_INFO_SIZE > slice.len() {
                return Err(ParseError::truncated(
                    "external relocation table",
                    entry_offset + reloc::RELOCATION_INFO_SIZE,
                    slice.len(),
                ));
            }
            let info = RelocationInfo::parse(&slice[entry_offset..], endian)?;
            relocations.push(info.to_external());
        }
        Ok(relocations)
    }

    /// Maps a virtual address to an offset into the backing file, if the
    /// address is file-backed.
    fn file_offset_of(&self, vaddr: u64, len: usize) -> Option<usize> {
        for segment in &self.segments {
            if !segment.contains(vaddr) {
                continue;
            }
            let offset_in_seg = vaddr - segment.vmaddr;
            if offset_in_seg + len as u64 > segment.filesize {
                continue;
            }
            let file_offset = self.slice_offset + (segment.fileoff + offset_in_seg) as usize;
            if file_offset + len <= self.data.len() {
                return Some(file_offset);
            }
        }
        None
    }
}

impl BinaryImage for MachImage {
    fn endian(&self) -> Endian {
        self.endian
    }

    fn symbols(&self) -> &[SymbolRecord] {
        &self.symbols
    }

    fn content_at(&self, vaddr: u64, len: usize) -> Option<&[u8]> {
        for segment in &self.segments {
            if !segment.contains(vaddr) {
                continue;
            }
            let offset_in_seg = vaddr - segment.vmaddr;
            if offset_in_seg >= segment.filesize {
                continue;
            }
            let available = (segment.filesize - offset_in_seg) as usize;
            let to_read = len.min(available);
            let file_offset = self.slice_offset + (segment.fileoff + offset_in_seg) as usize;
            let end = file_offset + to_read;
            if end <= self.data.len() {
                return Some(&self.data[file_offset..end]);
            }
        }
        None
    }

    fn section_at(&self, vaddr: u64) -> Option<SectionRef<'_>> {
        for segment in &self.segments {
            for section in &segment.sections {
                if section.contains(vaddr) {
                    return Some(SectionRef {
                        name: &section.sectname,
                        addr: section.addr,
                        size: section.size,
                    });
                }
            }
        }
        None
    }

    fn external_relocations(&self) -> &[ExternalRelocation] {
        &self.relocations
    }

    fn patch_u32(&mut self, vaddr: u64, value: u32) -> bool {
        match self.file_offset_of(vaddr, 4) {
            Some(offset) => {
                self.endian.write_u32(&mut self.data[offset..], value);
                true
            }
            None => false,
        }
    }
}
