//! Reader for built module images.
//!
//! Extracts what a full-module replacement needs from a freshly built
//! PE/CLI binary: the module version id, the raw bytes of the first
//! section, and a token for every type definition.

mod metadata;
mod pe;
mod reader;

#[cfg(test)]
pub(crate) mod fixture;
#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

pub use metadata::TYPE_DEF_TOKEN;

pub type Result<T, E = ImageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected end of image at offset {0}")]
    UnexpectedEof(usize),

    #[error("missing {0} signature")]
    BadSignature(&'static str),

    #[error("unsupported optional header magic 0x{0:03x}")]
    UnsupportedMagic(u16),

    #[error("image has no CLI header")]
    NotManaged,

    #[error("RVA 0x{0:08x} is not mapped by any section")]
    UnmappedRva(u32),

    #[error("metadata stream `{0}` is missing")]
    MissingStream(&'static str),

    #[error("malformed metadata: {0}")]
    Malformed(&'static str),
}

/// Structural summary of a managed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    /// Module version id, derived from content by the compiler.
    pub module_id: Uuid,
    /// Raw bytes of the first section.
    pub code: Vec<u8>,
    /// `TypeDef` tokens, in row order.
    pub type_tokens: Vec<u32>,
}

impl ModuleImage {
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let pe = pe::PeImage::parse(data)?;
        let metadata = metadata::read(&pe)?;
        Ok(Self {
            module_id: metadata.mvid,
            code: pe.first_section()?.to_vec(),
            type_tokens: (1..=metadata.type_def_count)
                .map(|row| TYPE_DEF_TOKEN | row)
                .collect(),
        })
    }
}
