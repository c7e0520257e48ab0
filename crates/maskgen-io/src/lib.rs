//! # maskgen I/O
//!
//! GDS-II and OASIS writers and readers for `maskgen_core::Library`, file
//! format selection by extension, and the JSON manifest the fixture
//! generators emit next to their output.

pub mod gds;
pub mod manifest;
pub mod oasis;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use maskgen_core::library::Library;

pub use gds::{GdsError, GdsReader, GdsWriter};
pub use manifest::{FileEntry, FixtureManifest};
pub use oasis::{OasisError, OasisReader, OasisWriter};

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Gds(#[from] GdsError),

    #[error(transparent)]
    Oasis(#[from] OasisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown layout format for '{0}' (expected .gds or .oas)")]
    UnknownFormat(String),
}

/// Layout stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutFormat {
    Gds,
    Oasis,
}

impl LayoutFormat {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gds") | Some("gds2") | Some("gdsii") => Ok(LayoutFormat::Gds),
            Some("oas") | Some("oasis") => Ok(LayoutFormat::Oasis),
            _ => Err(IoError::UnknownFormat(path.display().to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            LayoutFormat::Gds => "gds",
            LayoutFormat::Oasis => "oas",
        }
    }
}

/// Encode `lib` in memory.
pub fn encode_library(lib: &Library, format: LayoutFormat) -> Result<Vec<u8>, IoError> {
    let mut bytes = Vec::new();
    match format {
        LayoutFormat::Gds => GdsWriter::new(&mut bytes).write(lib)?,
        LayoutFormat::Oasis => OasisWriter::new(&mut bytes).write(lib)?,
    }
    Ok(bytes)
}

/// Write `lib` to `path` in the format implied by its extension.
///
/// The library is fully encoded before the file is created, so a failed
/// encode leaves nothing on disk.
pub fn write_library(path: &Path, lib: &Library) -> Result<LayoutFormat, IoError> {
    let format = LayoutFormat::from_path(path)?;
    let bytes = encode_library(lib, format)?;
    fs::write(path, &bytes)?;
    log::info!("Saved {} ({:?}, {} bytes)", path.display(), format, bytes.len());
    Ok(format)
}

pub fn read_library(path: &Path) -> Result<Library, IoError> {
    let input = BufReader::new(File::open(path)?);
    let lib = match LayoutFormat::from_path(path)? {
        LayoutFormat::Gds => GdsReader::new(input).read()?,
        LayoutFormat::Oasis => OasisReader::new(input).read()?,
    };
    Ok(lib)
}
