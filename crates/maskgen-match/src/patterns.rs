//! A searchable, JSON-backed collection of named patterns.
//!
//! A pattern is a cell of shapes plus a free-text description. Libraries
//! are exported as a JSON document holding every pattern; single patterns
//! can be exported and imported on their own.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use maskgen_core::cell::Cell;

use crate::error::MatchError;
use crate::graph::{find_matches, AdjacencyGraph, PatternMatch};
use crate::hierarchy::{build_hierarchy, Hierarchy};

#[derive(Error, Debug)]
pub enum PatternLibraryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern '{0}' already exists")]
    DuplicatePattern(String),

    #[error("Pattern '{0}' has no shapes")]
    EmptyPattern(String),
}

/// A named group of shapes to look for in flat layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default)]
    pub description: String,
    pub cell: Cell,
}

impl Pattern {
    pub fn new(cell: Cell) -> Self {
        Self {
            description: String::new(),
            cell,
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Translated occurrences of this pattern among `target`'s shapes.
    pub fn find_in(&self, target: &Cell) -> Vec<PatternMatch> {
        let pattern = AdjacencyGraph::from_shapes(&self.cell.geometries);
        let target = AdjacencyGraph::from_shapes(&target.geometries);
        find_matches(&pattern, &target)
    }

    /// Rebuild `flat` with this pattern pulled out into `cell_name`.
    pub fn build_hierarchy(&self, flat: &Cell, cell_name: &str) -> Result<Hierarchy, MatchError> {
        build_hierarchy(flat, &self.cell, cell_name)
    }

    fn matches_query(&self, needle: &str) -> bool {
        self.name().to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

/// Named patterns in insertion order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternLibrary {
    pub name: String,
    patterns: Vec<Pattern>,
}

impl PatternLibrary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            patterns: Vec::new(),
        }
    }

    pub fn add(&mut self, pattern: Pattern) -> Result<(), PatternLibraryError> {
        if pattern.cell.geometries.is_empty() {
            return Err(PatternLibraryError::EmptyPattern(pattern.name().to_string()));
        }
        if self.get(pattern.name()).is_some() {
            return Err(PatternLibraryError::DuplicatePattern(pattern.name().to_string()));
        }
        log::debug!("Added pattern '{}' to '{}'", pattern.name(), self.name);
        self.patterns.push(pattern);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Pattern> {
        let idx = self.patterns.iter().position(|p| p.name() == name)?;
        Some(self.patterns.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.name() == name)
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns whose name or description contains `query`, ignoring case.
    /// An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Pattern> {
        let needle = query.to_lowercase();
        self.patterns
            .iter()
            .filter(|p| p.matches_query(&needle))
            .collect()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, PatternLibraryError> {
        let lib: Self = serde_json::from_str(json)?;
        lib.check_names()?;
        Ok(lib)
    }

    pub fn save(&self, path: &Path) -> Result<(), PatternLibraryError> {
        fs::write(path, self.to_json()?)?;
        log::info!(
            "Saved pattern library '{}' ({} patterns) to {}",
            self.name,
            self.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PatternLibraryError> {
        let lib = Self::from_json(&fs::read_to_string(path)?)?;
        log::info!("Loaded pattern library '{}' ({} patterns)", lib.name, lib.len());
        Ok(lib)
    }

    /// Write one pattern as a standalone JSON document.
    pub fn export_pattern(&self, name: &str, path: &Path) -> Result<bool, PatternLibraryError> {
        let Some(pattern) = self.get(name) else {
            return Ok(false);
        };
        fs::write(path, serde_json::to_string_pretty(pattern)?)?;
        Ok(true)
    }

    /// Read a standalone pattern document into the library.
    pub fn import_pattern(&mut self, path: &Path) -> Result<&Pattern, PatternLibraryError> {
        let pattern: Pattern = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.add(pattern)?;
        let idx = self.patterns.len() - 1;
        Ok(&self.patterns[idx])
    }

    fn check_names(&self) -> Result<(), PatternLibraryError> {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if self.patterns[..i].iter().any(|p| p.name() == pattern.name()) {
                return Err(PatternLibraryError::DuplicatePattern(pattern.name().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskgen_core::geometry::Rect;
    use maskgen_core::layer::LayerSpec;

    const LAYER: LayerSpec = LayerSpec::new(1, 0);

    fn l_pattern(name: &str) -> Pattern {
        let mut cell = Cell::new(name);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
            cell.add_geometry(Rect::new(LAYER, x, y, x + 1.0, y + 1.0)).unwrap();
        }
        Pattern::new(cell)
    }

    fn sample_library() -> PatternLibrary {
        let mut lib = PatternLibrary::new("Standard");
        lib.add(l_pattern("L_CORNER").with_description("three unit squares"))
            .unwrap();
        lib.add(l_pattern("VIA_ARRAY").with_description("Contact grid for metal 1"))
            .unwrap();
        lib.add(l_pattern("guard_ring")).unwrap();
        lib
    }

    #[test]
    fn test_add_remove_get() {
        let mut lib = sample_library();
        assert_eq!(lib.len(), 3);
        assert_eq!(lib.get("VIA_ARRAY").unwrap().description, "Contact grid for metal 1");

        assert!(matches!(
            lib.add(l_pattern("L_CORNER")),
            Err(PatternLibraryError::DuplicatePattern(name)) if name == "L_CORNER"
        ));
        assert!(matches!(
            lib.add(Pattern::new(Cell::new("EMPTY"))),
            Err(PatternLibraryError::EmptyPattern(_))
        ));

        let removed = lib.remove("L_CORNER").unwrap();
        assert_eq!(removed.name(), "L_CORNER");
        assert!(lib.remove("L_CORNER").is_none());
        let names: Vec<&str> = lib.patterns().iter().map(Pattern::name).collect();
        assert_eq!(names, vec!["VIA_ARRAY", "guard_ring"]);
    }

    #[test]
    fn test_search_name_or_description() {
        let lib = sample_library();
        let names = |query: &str| -> Vec<String> {
            lib.search(query).iter().map(|p| p.name().to_string()).collect()
        };
        assert_eq!(names("via"), vec!["VIA_ARRAY"]);
        assert_eq!(names("METAL"), vec!["VIA_ARRAY"]);
        assert_eq!(names("squares"), vec!["L_CORNER"]);
        assert_eq!(names("RING"), vec!["guard_ring"]);
        assert_eq!(names("").len(), 3);
        assert!(names("poly").is_empty());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let lib = sample_library();
        lib.save(&path).unwrap();

        let loaded = PatternLibrary::load(&path).unwrap();
        assert_eq!(loaded, lib);
        assert_eq!(loaded.get("guard_ring").unwrap().cell.geometry_count(), 3);
    }

    #[test]
    fn test_load_rejects_duplicate_names() {
        let mut lib = sample_library();
        lib.patterns.push(l_pattern("guard_ring"));
        let json = lib.to_json().unwrap();
        assert!(matches!(
            PatternLibrary::from_json(&json),
            Err(PatternLibraryError::DuplicatePattern(name)) if name == "guard_ring"
        ));
        assert!(matches!(
            PatternLibrary::from_json("[1, 2]"),
            Err(PatternLibraryError::Json(_))
        ));
    }

    #[test]
    fn test_export_import_single_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l_corner.json");
        let lib = sample_library();
        assert!(lib.export_pattern("L_CORNER", &path).unwrap());
        assert!(!lib.export_pattern("MISSING", &dir.path().join("missing.json")).unwrap());

        let mut other = PatternLibrary::new("Imported");
        let imported = other.import_pattern(&path).unwrap();
        assert_eq!(imported, lib.get("L_CORNER").unwrap());
        assert!(matches!(
            other.import_pattern(&path),
            Err(PatternLibraryError::DuplicatePattern(_))
        ));
    }

    #[test]
    fn test_pattern_finds_translated_copies() {
        let pattern = l_pattern("L_CORNER");
        let mut flat = Cell::new("TOP");
        for origin in [0.0, 3.0] {
            for shape in &pattern.cell.geometries {
                flat.add_geometry(shape.translate(origin, 0.0)).unwrap();
            }
        }
        let offsets: Vec<(f64, f64)> = pattern
            .find_in(&flat)
            .iter()
            .map(|m| (m.offset.x, m.offset.y))
            .collect();
        assert_eq!(offsets, vec![(0.0, 0.0), (3.0, 0.0)]);

        let hierarchy = pattern.build_hierarchy(&flat, "L_CELL").unwrap();
        assert_eq!(hierarchy.accepted.len(), 2);
        assert_eq!(hierarchy.remainder_count(), 0);
    }
}
