use uuid::Uuid;

use super::fixture::{OPTIONAL_HEADER, SECTION_RVA, build_image, put_u16, put_u32};
use super::pe::PeImage;
use super::*;

const MVID: [u8; 16] = [
    0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56,
    0x78,
];

#[test]
fn test_reads_module_identity_and_types() {
    let image = ModuleImage::parse(&build_image(MVID, 3)).unwrap();

    assert_eq!(
        image.module_id,
        Uuid::parse_str("12345678-1234-5678-9abc-def012345678").unwrap()
    );
    assert_eq!(image.type_tokens, vec![0x0200_0001, 0x0200_0002, 0x0200_0003]);
}

#[test]
fn test_code_is_whole_first_section() {
    let bytes = build_image(MVID, 1);
    let pe = PeImage::parse(&bytes).unwrap();
    let section = &pe.sections()[0];
    assert_eq!(section.name, ".text");
    assert_eq!(section.virtual_address, SECTION_RVA);

    let image = ModuleImage::parse(&bytes).unwrap();
    assert_eq!(image.code.len(), section.raw_size as usize);
    assert_eq!(&image.code[..], &bytes[section.raw_offset as usize..]);
}

#[test]
fn test_image_without_type_definitions() {
    let image = ModuleImage::parse(&build_image(MVID, 0)).unwrap();
    assert!(image.type_tokens.is_empty());
}

#[test]
fn test_rejects_non_pe_input() {
    assert!(matches!(
        ModuleImage::parse(b"#!/bin/sh\necho not an image\n"),
        Err(ImageError::BadSignature("DOS"))
    ));
    assert!(matches!(
        ModuleImage::parse(&[0x4d, 0x5a]),
        Err(ImageError::UnexpectedEof(_))
    ));
}

#[test]
fn test_rejects_native_image() {
    let mut bytes = build_image(MVID, 1);
    put_u32(&mut bytes, OPTIONAL_HEADER + 92, 14);
    assert!(matches!(
        ModuleImage::parse(&bytes),
        Err(ImageError::NotManaged)
    ));
}

#[test]
fn test_rejects_unknown_optional_header() {
    let mut bytes = build_image(MVID, 1);
    put_u16(&mut bytes, OPTIONAL_HEADER, 0x107);
    assert!(matches!(
        ModuleImage::parse(&bytes),
        Err(ImageError::UnsupportedMagic(0x107))
    ));
}

#[test]
fn test_read_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModuleImage::read(&dir.path().join("App.dll")).unwrap_err();
    assert!(matches!(err, ImageError::Io { .. }));
    assert!(err.to_string().contains("App.dll"));
}

#[test]
fn test_section_offset_overflow_is_an_error() {
    let mut bytes = build_image(MVID, 1);
    // PointerToRawData of the only section.
    put_u32(&mut bytes, OPTIONAL_HEADER + 224 + 20, u32::MAX);

    let pe = PeImage::parse(&bytes).unwrap();
    assert!(matches!(
        pe.offset_of(SECTION_RVA + 72),
        Err(ImageError::UnmappedRva(_))
    ));
    assert!(ModuleImage::parse(&bytes).is_err());
}
