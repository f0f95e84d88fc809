//! CLI header, metadata root and the `#~` table stream.

use uuid::Uuid;

use super::pe::PeImage;
use super::reader::Reader;
use super::{ImageError, Result};

const METADATA_SIGNATURE: u32 = 0x424a_5342;

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_EXTRA_DATA: u8 = 0x40;

const TABLE_MODULE: u32 = 0;
const TABLE_TYPE_DEF: u32 = 2;

/// Token type for TypeDef rows.
pub const TYPE_DEF_TOKEN: u32 = 0x0200_0000;

#[derive(Debug, Clone, Copy)]
struct Stream {
    offset: usize,
    size: usize,
}

/// What the engine needs from the metadata.
#[derive(Debug)]
pub(crate) struct Metadata {
    pub mvid: Uuid,
    pub type_def_count: u32,
}

pub(crate) fn read(pe: &PeImage<'_>) -> Result<Metadata> {
    let data = pe.data();

    // CLI header: cb, runtime version, then the metadata directory.
    let mut r = Reader::at(data, pe.offset_of(pe.cli_header().rva)?)?;
    r.skip(8)?;
    let metadata_rva = r.u32()?;
    let root = pe.offset_of(metadata_rva)?;

    let mut r = Reader::at(data, root)?;
    if r.u32()? != METADATA_SIGNATURE {
        return Err(ImageError::BadSignature("metadata"));
    }
    r.skip(8)?; // major, minor, reserved
    let version_len = r.u32()? as usize;
    r.skip(version_len)?;
    r.skip(2)?; // flags
    let stream_count = r.u16()?;

    let mut tables = None;
    let mut guids = None;
    for _ in 0..stream_count {
        let stream = Stream {
            offset: root + r.u32()? as usize,
            size: r.u32()? as usize,
        };
        match r.padded_name()? {
            b"#~" | b"#-" => tables = Some(stream),
            b"#GUID" => guids = Some(stream),
            _ => {}
        }
    }
    let tables = tables.ok_or(ImageError::MissingStream("#~"))?;
    let guids = guids.ok_or(ImageError::MissingStream("#GUID"))?;

    let mut r = Reader::at(data, tables.offset)?;
    r.skip(6)?; // reserved, major, minor
    let heap_sizes = r.u8()?;
    r.skip(1)?;
    let valid = r.u64()?;
    let _sorted = r.u64()?;

    let mut rows = [0u32; 64];
    for (table, count) in rows.iter_mut().enumerate() {
        if valid & (1u64 << table) != 0 {
            *count = r.u32()?;
        }
    }
    if heap_sizes & HEAP_EXTRA_DATA != 0 {
        r.skip(4)?;
    }

    if rows[TABLE_MODULE as usize] == 0 {
        return Err(ImageError::Malformed("module table is empty"));
    }
    // Module is table 0, so its first row starts the table data.
    let _generation = r.u16()?;
    let _name = r.index(heap_sizes & HEAP_STRINGS_WIDE != 0)?;
    let mvid_index = r.index(heap_sizes & HEAP_GUID_WIDE != 0)?;

    Ok(Metadata {
        mvid: read_guid(data, guids, mvid_index)?,
        type_def_count: rows[TABLE_TYPE_DEF as usize],
    })
}

/// GUID heap indexes are 1-based, 16 bytes per entry.
fn read_guid(data: &[u8], heap: Stream, index: u32) -> Result<Uuid> {
    if index == 0 {
        return Ok(Uuid::nil());
    }
    let start = (index as usize - 1) * 16;
    if start + 16 > heap.size {
        return Err(ImageError::Malformed("module version id outside #GUID heap"));
    }
    let mut r = Reader::at(data, heap.offset + start)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(r.bytes(16)?);
    Ok(Uuid::from_bytes_le(bytes))
}
