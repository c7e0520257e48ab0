use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geometry::{BBox, GeomPrimitive, Point};
use crate::grid::GridSpec;
use crate::layer::LayerSpec;

/// A transformation for placing subcell instances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation offset.
    pub offset: Point,
    /// Rotation in degrees, counter-clockwise.
    pub rotation: f64,
    /// Mirror about X axis, applied before rotation.
    pub mirror_x: bool,
    /// Uniform scale factor (typically 1.0).
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            offset: Point::new(0.0, 0.0),
            rotation: 0.0,
            mirror_x: false,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            offset: Point::new(x, y),
            ..Default::default()
        }
    }

    /// True when only the offset differs from the identity.
    pub fn is_translation(&self) -> bool {
        self.rotation == 0.0 && !self.mirror_x && self.scale == 1.0
    }

    pub fn apply(&self, point: &Point) -> Point {
        let mut p = *point;

        p.x *= self.scale;
        p.y *= self.scale;

        if self.mirror_x {
            p.y = -p.y;
        }

        let rad = self.rotation.to_radians();
        let cos_r = rad.cos();
        let sin_r = rad.sin();
        let rx = p.x * cos_r - p.y * sin_r;
        let ry = p.x * sin_r + p.y * cos_r;

        Point::new(rx + self.offset.x, ry + self.offset.y)
    }
}

/// A reference to another cell of the same library, by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellInstance {
    pub cell_name: String,
    pub transform: Transform,
}

impl CellInstance {
    pub fn new(cell_name: &str, transform: Transform) -> Self {
        Self {
            cell_name: cell_name.to_string(),
            transform,
        }
    }
}

/// A named container of shapes and subcell references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    pub geometries: Vec<GeomPrimitive>,
    pub instances: Vec<CellInstance>,
}

impl Cell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            geometries: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Add a shape after checking its coordinates.
    pub fn add_geometry(&mut self, geom: impl Into<GeomPrimitive>) -> Result<(), CoreError> {
        let geom = geom.into();
        geom.validate()?;
        self.geometries.push(geom);
        Ok(())
    }

    /// Add every rectangle of a grid. Nothing is added if the grid is invalid.
    pub fn add_grid(&mut self, grid: &GridSpec) -> Result<usize, CoreError> {
        let rects = grid.iter()?;
        let count = rects.len();
        self.geometries.reserve(count);
        self.geometries.extend(rects.map(GeomPrimitive::Rect));
        log::debug!("Cell '{}': added {} grid shapes on {}", self.name, count, grid.layer);
        Ok(count)
    }

    pub fn add_instance(&mut self, instance: CellInstance) {
        self.instances.push(instance);
    }

    /// Compute the bounding box of all geometry in this cell (not including subcells).
    pub fn local_bbox(&self) -> Option<BBox> {
        self.geometries
            .iter()
            .filter_map(|g| g.bbox())
            .reduce(|acc, bb| acc.union(&bb))
    }

    /// Get all geometries on a specific layer/datatype pair.
    pub fn geometries_on_layer(&self, layer: LayerSpec) -> Vec<&GeomPrimitive> {
        self.geometries
            .iter()
            .filter(|g| g.layer() == layer)
            .collect()
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, Rect};

    const L0: LayerSpec = LayerSpec::new(0, 0);
    const L1: LayerSpec = LayerSpec::new(1, 0);

    #[test]
    fn test_cell_add_geometry() {
        let mut cell = Cell::new("test_cell");
        cell.add_geometry(Rect::new(L0, 0.0, 0.0, 100.0, 50.0)).unwrap();
        assert_eq!(cell.geometry_count(), 1);
    }

    #[test]
    fn test_cell_rejects_invalid_geometry() {
        let mut cell = Cell::new("test_cell");
        let err = cell
            .add_geometry(Polygon::from_coords(L0, &[(0.0, 0.0), (f64::INFINITY, 1.0), (1.0, 0.0)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::NonFiniteCoordinate { .. }));
        assert_eq!(cell.geometry_count(), 0);
    }

    #[test]
    fn test_cell_bbox() {
        let mut cell = Cell::new("test_cell");
        cell.add_geometry(Rect::new(L0, 0.0, 0.0, 100.0, 50.0)).unwrap();
        cell.add_geometry(Rect::new(L1, 50.0, 25.0, 200.0, 75.0)).unwrap();
        let bb = cell.local_bbox().unwrap();
        assert!((bb.min.x - 0.0).abs() < 1e-10);
        assert!((bb.min.y - 0.0).abs() < 1e-10);
        assert!((bb.max.x - 200.0).abs() < 1e-10);
        assert!((bb.max.y - 75.0).abs() < 1e-10);
        assert_eq!(cell.geometries_on_layer(L1).len(), 1);
    }

    #[test]
    fn test_add_grid() {
        let mut cell = Cell::new("INPUT_CELL");
        let grid = GridSpec::square(Point::new(0.0, 0.0), 1.0, 2.0, 4, LayerSpec::new(2, 0));
        assert_eq!(cell.add_grid(&grid).unwrap(), 16);
        assert_eq!(cell.geometry_count(), 16);

        let bad = GridSpec::square(Point::new(0.0, 0.0), 1.0, 0.0, 4, LayerSpec::new(2, 0));
        assert!(cell.add_grid(&bad).is_err());
        assert_eq!(cell.geometry_count(), 16);
    }

    #[test]
    fn test_transform_translate() {
        let t = Transform::translate(10.0, 20.0);
        assert!(t.is_translation());
        let result = t.apply(&Point::new(5.0, 5.0));
        assert!((result.x - 15.0).abs() < 1e-10);
        assert!((result.y - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_transform_mirror_then_rotate() {
        let t = Transform {
            rotation: 90.0,
            mirror_x: true,
            ..Default::default()
        };
        // (1, 2) -> mirror -> (1, -2) -> rotate 90 -> (2, 1)
        let result = t.apply(&Point::new(1.0, 2.0));
        assert!((result.x - 2.0).abs() < 1e-10);
        assert!((result.y - 1.0).abs() < 1e-10);
    }
}
