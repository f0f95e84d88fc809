//! PE/COFF headers.

use super::reader::Reader;
use super::{ImageError, Result};

const DOS_MAGIC: u16 = 0x5a4d;
const PE_SIGNATURE: u32 = 0x0000_4550;
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const CLI_HEADER_DIRECTORY: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub raw_size: u32,
    pub raw_offset: u32,
}

impl Section {
    fn contains(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && rva - self.virtual_address < extent
    }
}

/// Parsed headers of a managed PE image.
#[derive(Debug)]
pub(crate) struct PeImage<'a> {
    data: &'a [u8],
    sections: Vec<Section>,
    cli_header: DataDirectory,
}

impl<'a> PeImage<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        if r.u16()? != DOS_MAGIC {
            return Err(ImageError::BadSignature("DOS"));
        }
        r.seek(0x3c)?;
        let pe_offset = r.u32()? as usize;
        r.seek(pe_offset)?;
        if r.u32()? != PE_SIGNATURE {
            return Err(ImageError::BadSignature("PE"));
        }

        // COFF file header
        let _machine = r.u16()?;
        let section_count = r.u16()?;
        r.skip(12)?;
        let optional_size = r.u16()? as usize;
        let _characteristics = r.u16()?;

        let optional_start = r.pos();
        let directories = match r.u16()? {
            PE32_MAGIC => optional_start + 96,
            PE32_PLUS_MAGIC => optional_start + 112,
            magic => return Err(ImageError::UnsupportedMagic(magic)),
        };
        r.seek(directories - 4)?;
        let directory_count = r.u32()?;
        if directory_count <= CLI_HEADER_DIRECTORY {
            return Err(ImageError::NotManaged);
        }
        r.seek(directories + CLI_HEADER_DIRECTORY as usize * 8)?;
        let cli_header = DataDirectory {
            rva: r.u32()?,
            size: r.u32()?,
        };
        if cli_header.rva == 0 {
            return Err(ImageError::NotManaged);
        }

        r.seek(optional_start + optional_size)?;
        let mut sections = Vec::with_capacity(section_count as usize);
        for _ in 0..section_count {
            let name = r.bytes(8)?;
            let name_len = name.iter().position(|b| *b == 0).unwrap_or(name.len());
            let section = Section {
                name: String::from_utf8_lossy(&name[..name_len]).into_owned(),
                virtual_size: r.u32()?,
                virtual_address: r.u32()?,
                raw_size: r.u32()?,
                raw_offset: r.u32()?,
            };
            // relocations, line numbers, characteristics
            r.skip(16)?;
            sections.push(section);
        }
        if sections.is_empty() {
            return Err(ImageError::Malformed("image has no sections"));
        }

        Ok(Self {
            data,
            sections,
            cli_header,
        })
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.data
    }

    pub(crate) fn cli_header(&self) -> DataDirectory {
        self.cli_header
    }

    /// File offset of a relative virtual address.
    pub(crate) fn offset_of(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find(|s| s.contains(rva))
            .ok_or(ImageError::UnmappedRva(rva))
            .and_then(|s| {
                (rva - s.virtual_address)
                    .checked_add(s.raw_offset)
                    .map(|offset| offset as usize)
                    .ok_or(ImageError::UnmappedRva(rva))
            })
    }

    /// Raw bytes of the first section.
    pub(crate) fn first_section(&self) -> Result<&'a [u8]> {
        let section = &self.sections[0];
        let start = section.raw_offset as usize;
        let end = start
            .checked_add(section.raw_size as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or(ImageError::UnexpectedEof(start))?;
        Ok(&self.data[start..end])
    }

    #[cfg(test)]
    pub(crate) fn sections(&self) -> &[Section] {
        &self.sections
    }
}
