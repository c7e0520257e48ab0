//! Rebuild hierarchy in a flat cell by replacing pattern occurrences with
//! instances of a new cell.

use std::collections::BTreeSet;

use maskgen_core::cell::{Cell, CellInstance, Transform};
use maskgen_core::library::{Library, Units};

use crate::error::MatchError;
use crate::graph::{find_matches, AdjacencyGraph, PatternMatch};

/// Result of [`build_hierarchy`].
#[derive(Debug, Clone)]
pub struct Hierarchy {
    /// The extracted cell, holding the pattern shapes.
    pub cell: Cell,
    /// New top cell: one instance per accepted match plus the leftover shapes.
    pub top: Cell,
    pub accepted: Vec<PatternMatch>,
}

impl Hierarchy {
    pub fn remainder_count(&self) -> usize {
        self.top.geometry_count()
    }

    /// Package both cells into a library, pattern cell first.
    pub fn into_library(self, name: &str, units: Units) -> Result<Library, MatchError> {
        let mut lib = Library::new(name).with_units(units);
        lib.add_cell(self.cell)?;
        lib.add_cell(self.top)?;
        lib.validate_references()?;
        Ok(lib)
    }
}

/// Replace occurrences of `pattern`'s shapes in `flat`.
///
/// Matches are accepted greedily in the order [`find_matches`] reports them,
/// skipping any that reuse an already claimed shape. The top cell keeps the
/// name of `flat`.
pub fn build_hierarchy(flat: &Cell, pattern: &Cell, cell_name: &str) -> Result<Hierarchy, MatchError> {
    if pattern.geometries.is_empty() {
        return Err(MatchError::EmptyPattern(pattern.name.clone()));
    }

    let pattern_graph = AdjacencyGraph::from_shapes(&pattern.geometries);
    let flat_graph = AdjacencyGraph::from_shapes(&flat.geometries);

    let mut claimed = BTreeSet::new();
    let mut accepted = Vec::new();
    for m in find_matches(&pattern_graph, &flat_graph) {
        let shapes = m.shape_set();
        if shapes.is_disjoint(&claimed) {
            claimed.extend(shapes);
            accepted.push(m);
        }
    }

    let mut cell = Cell::new(cell_name);
    for shape in &pattern.geometries {
        cell.add_geometry(shape.clone())?;
    }

    let mut top = Cell::new(&flat.name);
    for m in &accepted {
        top.add_instance(CellInstance::new(
            cell_name,
            Transform::translate(m.offset.x, m.offset.y),
        ));
    }
    for (i, shape) in flat.geometries.iter().enumerate() {
        if !claimed.contains(&i) {
            top.add_geometry(shape.clone())?;
        }
    }
    top.instances.extend(flat.instances.iter().cloned());

    log::info!(
        "Built '{}' from {} shapes: {} instances of '{}', {} shapes left flat",
        top.name,
        flat.geometry_count(),
        accepted.len(),
        cell_name,
        top.geometry_count()
    );
    Ok(Hierarchy { cell, top, accepted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskgen_core::geometry::Rect;
    use maskgen_core::layer::LayerSpec;

    fn add_square(cell: &mut Cell, x: f64, y: f64) {
        cell.add_geometry(Rect::new(LayerSpec::new(1, 0), x, y, x + 1.0, y + 1.0))
            .unwrap();
    }

    fn l_pattern() -> Cell {
        let mut cell = Cell::new("PATTERN");
        add_square(&mut cell, 0.0, 0.0);
        add_square(&mut cell, 1.0, 0.0);
        add_square(&mut cell, 1.0, 1.0);
        cell
    }

    fn flat_layout() -> Cell {
        let mut flat = Cell::new("TOP");
        for dx in [0.0, 3.0, 6.0] {
            add_square(&mut flat, dx, 0.0);
            add_square(&mut flat, dx + 1.0, 0.0);
            add_square(&mut flat, dx + 1.0, 1.0);
        }
        flat
    }

    #[test]
    fn test_nine_squares_become_three_instances() {
        let h = build_hierarchy(&flat_layout(), &l_pattern(), "L_CELL").unwrap();
        assert_eq!(h.cell.name, "L_CELL");
        assert_eq!(h.cell.geometry_count(), 3);
        assert_eq!(h.top.name, "TOP");
        assert_eq!(h.remainder_count(), 0);

        let offsets: Vec<(f64, f64)> = h
            .top
            .instances
            .iter()
            .map(|i| (i.transform.offset.x, i.transform.offset.y))
            .collect();
        assert_eq!(offsets, vec![(0.0, 0.0), (3.0, 0.0), (6.0, 0.0)]);
        assert!(h.top.instances.iter().all(|i| i.cell_name == "L_CELL"));

        let lib = h.into_library("hierarchy", Units::default()).unwrap();
        assert_eq!(lib.cell_names(), vec!["L_CELL", "TOP"]);
        assert_eq!(lib.top_cells()[0].name, "TOP");
    }

    #[test]
    fn test_unmatched_shapes_stay_flat() {
        let mut flat = flat_layout();
        add_square(&mut flat, 20.0, 20.0);
        let h = build_hierarchy(&flat, &l_pattern(), "L_CELL").unwrap();
        assert_eq!(h.accepted.len(), 3);
        assert_eq!(h.remainder_count(), 1);
        assert_eq!(h.top.geometries[0].bbox().unwrap().min.x, 20.0);
    }

    #[test]
    fn test_overlapping_matches_accepted_greedily() {
        // pattern of two abutting squares in a row of three: matches {0,1} and {1,2}
        let mut pattern = Cell::new("PAIR");
        add_square(&mut pattern, 0.0, 0.0);
        add_square(&mut pattern, 1.0, 0.0);
        let mut flat = Cell::new("ROW");
        for x in [0.0, 1.0, 2.0] {
            add_square(&mut flat, x, 0.0);
        }

        let h = build_hierarchy(&flat, &pattern, "PAIR_CELL").unwrap();
        assert_eq!(h.accepted.len(), 1);
        assert_eq!(h.accepted[0].mapping, vec![0, 1]);
        assert_eq!(h.remainder_count(), 1);
    }

    #[test]
    fn test_no_match_is_not_an_error() {
        let mut flat = Cell::new("TOP");
        add_square(&mut flat, 0.0, 0.0);
        let h = build_hierarchy(&flat, &l_pattern(), "L_CELL").unwrap();
        assert!(h.top.instances.is_empty());
        assert_eq!(h.remainder_count(), 1);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = build_hierarchy(&flat_layout(), &Cell::new("EMPTY"), "L_CELL").unwrap_err();
        assert_eq!(err, MatchError::EmptyPattern("EMPTY".into()));
    }
}
