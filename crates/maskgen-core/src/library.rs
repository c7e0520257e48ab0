use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::error::CoreError;
use crate::layer::{LayerSpec, LayerStack};

/// Library units, both in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Units {
    /// Size of one user unit (default 1 µm).
    pub user_unit: f64,
    /// Size of one database unit (default 1 nm).
    pub precision: f64,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            user_unit: 1e-6,
            precision: 1e-9,
        }
    }
}

impl Units {
    pub fn new(user_unit: f64, precision: f64) -> Result<Self, CoreError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(user_unit) || !valid(precision) {
            return Err(CoreError::InvalidUnits {
                user_unit,
                precision,
            });
        }
        Ok(Self {
            user_unit,
            precision,
        })
    }

    /// Database units per user unit.
    pub fn dbu_per_user_unit(&self) -> f64 {
        snap_ratio(self.user_unit / self.precision)
    }

    /// Database units per micron (the OASIS resolution).
    pub fn dbu_per_micron(&self) -> f64 {
        snap_ratio(1e-6 / self.precision)
    }

    /// Convert a user-unit coordinate to the nearest database unit.
    pub fn to_dbu(&self, value: f64) -> f64 {
        (value * self.dbu_per_user_unit()).round()
    }

    pub fn from_dbu(&self, value: i64) -> f64 {
        value as f64 / self.dbu_per_user_unit()
    }
}

/// Unit ratios such as `1e-6 / 1e-9` land one ulp off a whole number.
fn snap_ratio(ratio: f64) -> f64 {
    let whole = ratio.round();
    if whole != 0.0 && (ratio - whole).abs() < 1e-9 * ratio.abs() {
        whole
    } else {
        ratio
    }
}

/// A named, ordered collection of cells sharing one set of units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub units: Units,
    pub layer_stack: LayerStack,
    cells: Vec<Cell>,
}

impl Library {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            units: Units::default(),
            layer_stack: LayerStack::new(),
            cells: Vec::new(),
        }
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    // ── Cell management ──────────────────────────────────────────────

    pub fn add_cell(&mut self, cell: Cell) -> Result<&mut Cell, CoreError> {
        if self.get_cell(&cell.name).is_some() {
            return Err(CoreError::DuplicateCell(cell.name));
        }
        self.cells.push(cell);
        let idx = self.cells.len() - 1;
        Ok(&mut self.cells[idx])
    }

    /// Create an empty cell and return it for population.
    pub fn new_cell(&mut self, name: &str) -> Result<&mut Cell, CoreError> {
        self.add_cell(Cell::new(name))
    }

    pub fn get_cell(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.name == name)
    }

    pub fn get_cell_mut(&mut self, name: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.name == name)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell_names(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cells that no other cell instantiates, in library order.
    pub fn top_cells(&self) -> Vec<&Cell> {
        let referenced: BTreeSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.instances.iter().map(|i| i.cell_name.as_str()))
            .collect();
        self.cells
            .iter()
            .filter(|c| !referenced.contains(c.name.as_str()))
            .collect()
    }

    /// Check that every instance refers to a cell of this library.
    pub fn validate_references(&self) -> Result<(), CoreError> {
        for cell in &self.cells {
            for inst in &cell.instances {
                if self.get_cell(&inst.cell_name).is_none() {
                    return Err(CoreError::UndefinedCell(inst.cell_name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Total number of shapes over all cells, not counting instances.
    pub fn shape_count(&self) -> usize {
        self.cells.iter().map(|c| c.geometry_count()).sum()
    }

    /// Distinct layer/datatype pairs used by any shape.
    pub fn used_layers(&self) -> BTreeSet<LayerSpec> {
        self.cells
            .iter()
            .flat_map(|c| c.geometries.iter().map(|g| g.layer()))
            .collect()
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellInstance, Transform};
    use crate::geometry::Rect;

    #[test]
    fn test_library_create() {
        let lib = Library::new("MySimpleLib");
        assert_eq!(lib.name, "MySimpleLib");
        assert_eq!(lib.cell_count(), 0);
        assert!((lib.units.dbu_per_user_unit() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_cell_and_lookup() {
        let mut lib = Library::new("test");
        lib.new_cell("SIMPLE_CELL")
            .unwrap()
            .add_geometry(Rect::new(LayerSpec::new(1, 0), 0.0, 0.0, 10.0, 20.0))
            .unwrap();
        assert_eq!(lib.cell_count(), 1);
        assert_eq!(lib.get_cell("SIMPLE_CELL").unwrap().geometry_count(), 1);
        assert_eq!(lib.shape_count(), 1);
        assert_eq!(lib.cell_names(), vec!["SIMPLE_CELL"]);
    }

    #[test]
    fn test_duplicate_cell_rejected() {
        let mut lib = Library::new("test");
        lib.new_cell("TOP").unwrap();
        assert_eq!(
            lib.new_cell("TOP").unwrap_err(),
            CoreError::DuplicateCell("TOP".into())
        );
    }

    #[test]
    fn test_top_cells_and_references() {
        let mut lib = Library::new("test");
        lib.new_cell("L_CELL").unwrap();
        lib.new_cell("TOP")
            .unwrap()
            .add_instance(CellInstance::new("L_CELL", Transform::translate(3.0, 0.0)));
        let tops: Vec<&str> = lib.top_cells().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(tops, vec!["TOP"]);
        assert!(lib.validate_references().is_ok());

        lib.get_cell_mut("TOP")
            .unwrap()
            .add_instance(CellInstance::new("MISSING", Transform::default()));
        assert_eq!(
            lib.validate_references(),
            Err(CoreError::UndefinedCell("MISSING".into()))
        );
    }

    #[test]
    fn test_units_conversion() {
        let units = Units::default();
        assert_eq!(units.to_dbu(0.0015), 2.0);
        assert_eq!(units.to_dbu(-12.3456), -12346.0);
        assert!((units.from_dbu(50100) - 50.1).abs() < 1e-12);
        assert!((units.dbu_per_micron() - 1000.0).abs() < 1e-9);
        assert_eq!(units.dbu_per_user_unit(), 1000.0);
        assert_eq!(units.dbu_per_micron(), 1000.0);
        assert!(Units::new(0.0, 1e-9).is_err());
        assert!(Units::new(1e-6, f64::NAN).is_err());
    }

    #[test]
    fn test_ratio_snapping_keeps_fractional_ratios() {
        let dbu_grid = Units::new(1e-9, 1e-9).unwrap();
        assert_eq!(dbu_grid.dbu_per_user_unit(), 1.0);
        assert_eq!(dbu_grid.dbu_per_micron(), 1000.0);

        let odd = Units::new(1e-6, 4e-10 * 3.0).unwrap();
        assert!((odd.dbu_per_user_unit() - 833.333_333_333).abs() < 1e-6);
        assert_ne!(odd.dbu_per_user_unit(), odd.dbu_per_user_unit().round());
    }

    #[test]
    fn test_used_layers_and_json() {
        let mut lib = Library::new("MultiPolyLib");
        let cell = lib.new_cell("MultiPolyCell").unwrap();
        cell.add_geometry(Rect::new(LayerSpec::new(2, 1), 15.0, 0.0, 25.0, 5.0)).unwrap();
        cell.add_geometry(Rect::new(LayerSpec::new(1, 0), 0.0, 0.0, 10.0, 10.0)).unwrap();
        let layers: Vec<LayerSpec> = lib.used_layers().into_iter().collect();
        assert_eq!(layers, vec![LayerSpec::new(1, 0), LayerSpec::new(2, 1)]);

        let json = lib.to_json().unwrap();
        let back = Library::from_json(&json).unwrap();
        assert_eq!(back.name, "MultiPolyLib");
        assert_eq!(back.shape_count(), 2);
    }
}
