use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use maskgen_core::library::Library;

use crate::{IoError, LayoutFormat};

/// Summary of the files a fixture generator wrote (`<stem>.manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureManifest {
    pub generator: String,
    pub files: Vec<FileEntry>,
}

/// One written layout file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub format: LayoutFormat,
    pub library: String,
    pub cells: Vec<String>,
    /// Layer/datatype pairs as `"layer/datatype"`, ascending.
    pub layers: Vec<String>,
    /// Names from the library's layer stack, keyed like `layers`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layer_names: BTreeMap<String, String>,
    pub shape_count: usize,
}

impl FileEntry {
    pub fn describe(path: &Path, format: LayoutFormat, lib: &Library) -> Self {
        let used = lib.used_layers();
        let layer_names = used
            .iter()
            .filter_map(|&spec| {
                let layer = lib.layer_stack.get_layer_by_spec(spec)?;
                Some((spec.to_string(), layer.name.clone()))
            })
            .collect();
        Self {
            path: path.display().to_string(),
            format,
            library: lib.name.clone(),
            cells: lib.cell_names().into_iter().map(str::to_string).collect(),
            layers: used.iter().map(|l| l.to_string()).collect(),
            layer_names,
            shape_count: lib.shape_count(),
        }
    }
}

impl FixtureManifest {
    pub fn new(generator: &str) -> Self {
        Self {
            generator: generator.to_string(),
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    pub fn total_shapes(&self) -> usize {
        self.files.iter().map(|f| f.shape_count).sum()
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IoError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
