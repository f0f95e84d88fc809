//! Minimal managed PE32 image for tests.
//!
//! One `.text` section at RVA 0x2000 holding the CLI header, followed by a
//! metadata root with `#~`, `#Strings` and `#GUID` streams.

pub(crate) const OPTIONAL_HEADER: usize = 0x98;
pub(crate) const SECTION_RVA: u32 = 0x2000;
const SECTION_OFFSET: usize = 0x200;
const CLI_HEADER_LEN: usize = 72;

pub(crate) fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Image whose module version id is `mvid` with `type_defs` TypeDef rows.
pub(crate) fn build_image(mvid: [u8; 16], type_defs: u32) -> Vec<u8> {
    let section = build_section(mvid, type_defs);

    let mut image = vec![0u8; SECTION_OFFSET];
    put_u16(&mut image, 0, 0x5a4d);
    put_u32(&mut image, 0x3c, 0x80);
    put_u32(&mut image, 0x80, 0x4550);

    let coff = 0x84;
    put_u16(&mut image, coff, 0x14c);
    put_u16(&mut image, coff + 2, 1);
    put_u16(&mut image, coff + 16, 224);
    put_u16(&mut image, coff + 18, 0x2102);

    let opt = OPTIONAL_HEADER;
    put_u16(&mut image, opt, 0x10b);
    put_u32(&mut image, opt + 92, 16);
    put_u32(&mut image, opt + 96 + 14 * 8, SECTION_RVA);
    put_u32(&mut image, opt + 96 + 14 * 8 + 4, CLI_HEADER_LEN as u32);

    let header = opt + 224;
    image[header..header + 5].copy_from_slice(b".text");
    put_u32(&mut image, header + 8, section.len() as u32);
    put_u32(&mut image, header + 12, SECTION_RVA);
    put_u32(&mut image, header + 16, section.len() as u32);
    put_u32(&mut image, header + 20, SECTION_OFFSET as u32);

    image.extend_from_slice(&section);
    image
}

fn build_section(mvid: [u8; 16], type_defs: u32) -> Vec<u8> {
    let metadata = build_metadata(mvid, type_defs);
    let mut section = vec![0u8; CLI_HEADER_LEN];
    put_u32(&mut section, 0, CLI_HEADER_LEN as u32);
    put_u16(&mut section, 4, 2);
    put_u16(&mut section, 6, 5);
    put_u32(&mut section, 8, SECTION_RVA + CLI_HEADER_LEN as u32);
    put_u32(&mut section, 12, metadata.len() as u32);
    section.extend(metadata);
    section
}

fn build_metadata(mvid: [u8; 16], type_defs: u32) -> Vec<u8> {
    let mut tables = Vec::new();
    tables.extend(0u32.to_le_bytes());
    tables.extend([2, 0, 0, 1]);
    tables.extend(0b101u64.to_le_bytes()); // Module, TypeDef
    tables.extend(0u64.to_le_bytes());
    tables.extend(1u32.to_le_bytes());
    tables.extend(type_defs.to_le_bytes());
    for field in [0u16, 1, 1, 0, 0] {
        tables.extend(field.to_le_bytes());
    }
    pad4(&mut tables);

    let mut strings = b"\0Fixture.dll\0".to_vec();
    pad4(&mut strings);
    let guids = mvid.to_vec();

    let version = b"v4.0.30319\0\0";
    let names: [&[u8]; 3] = [b"#~\0\0", b"#Strings\0\0\0\0", b"#GUID\0\0\0"];
    let streams = [&tables, &strings, &guids];
    let header_len =
        16 + version.len() + 4 + names.iter().map(|name| 8 + name.len()).sum::<usize>();

    let mut metadata = Vec::new();
    metadata.extend(0x424a_5342u32.to_le_bytes());
    metadata.extend(1u16.to_le_bytes());
    metadata.extend(1u16.to_le_bytes());
    metadata.extend(0u32.to_le_bytes());
    metadata.extend((version.len() as u32).to_le_bytes());
    metadata.extend(version);
    metadata.extend(0u16.to_le_bytes());
    metadata.extend((names.len() as u16).to_le_bytes());

    let mut offset = header_len;
    for (name, body) in names.iter().zip(streams) {
        metadata.extend((offset as u32).to_le_bytes());
        metadata.extend((body.len() as u32).to_le_bytes());
        metadata.extend(*name);
        offset += body.len();
    }
    for body in streams {
        metadata.extend(body);
    }
    metadata
}
