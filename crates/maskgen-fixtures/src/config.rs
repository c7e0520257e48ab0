//! Generator parameters. Every field has a default, so a JSON override file
//! only needs the values it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use maskgen_core::geometry::Point;
use maskgen_core::grid::GridSpec;
use maskgen_core::layer::LayerSpec;

use crate::FixtureError;

/// A single large rectangle anchored at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskLayerConfig {
    pub cell_name: String,
    pub layer: LayerSpec,
    pub width: f64,
    pub height: f64,
}

impl Default for MaskLayerConfig {
    fn default() -> Self {
        Self {
            cell_name: "MASK_CELL".into(),
            layer: LayerSpec::new(1, 0),
            width: 100_000.0,
            height: 100_000.0,
        }
    }
}

/// A square grid of small squares overlapping the mask rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLayerConfig {
    pub cell_name: String,
    pub layer: LayerSpec,
    pub grid_dim: usize,
    pub square_size: f64,
    pub step_size: f64,
    pub origin: Point,
}

impl Default for InputLayerConfig {
    fn default() -> Self {
        Self {
            cell_name: "INPUT_CELL".into(),
            layer: LayerSpec::new(2, 0),
            grid_dim: 200,
            square_size: 100.0,
            step_size: 200.0,
            origin: Point::new(50_000.0, 50_000.0),
        }
    }
}

impl InputLayerConfig {
    pub fn grid(&self) -> GridSpec {
        GridSpec::square(
            self.origin,
            self.square_size,
            self.step_size,
            self.grid_dim,
            self.layer,
        )
    }
}

/// A large box grid in database units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskGridConfig {
    pub cell_name: String,
    pub layer: LayerSpec,
    pub columns: usize,
    pub rows: usize,
    pub box_width: f64,
    pub box_height: f64,
    pub pitch_x: f64,
    pub pitch_y: f64,
}

impl Default for MaskGridConfig {
    fn default() -> Self {
        Self {
            cell_name: "TOP".into(),
            layer: LayerSpec::new(10, 0),
            columns: 1000,
            rows: 1000,
            box_width: 1000.0,
            box_height: 1000.0,
            pitch_x: 1200.0,
            pitch_y: 1200.0,
        }
    }
}

impl MaskGridConfig {
    pub fn grid(&self) -> GridSpec {
        GridSpec {
            origin: Point::new(0.0, 0.0),
            shape_width: self.box_width,
            shape_height: self.box_height,
            step_x: self.pitch_x,
            step_y: self.pitch_y,
            columns: self.columns,
            rows: self.rows,
            layer: self.layer,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub mask_layer: MaskLayerConfig,
    pub input_layer: InputLayerConfig,
    pub mask_grid: MaskGridConfig,
}

impl FixtureConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, FixtureError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FixtureConfig::default();
        assert_eq!(config.mask_layer.cell_name, "MASK_CELL");
        assert_eq!(config.input_layer.grid().shape_count(), 40_000);
        assert_eq!(config.mask_grid.grid().shape_count(), 1_000_000);
        assert_eq!(config.mask_grid.layer, LayerSpec::new(10, 0));
    }

    #[test]
    fn test_partial_json_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        fs::write(
            &path,
            r#"{ "input_layer": { "grid_dim": 10, "layer": { "layer": 7, "datatype": 1 } } }"#,
        )
        .unwrap();

        let config = FixtureConfig::from_json_file(&path).unwrap();
        assert_eq!(config.input_layer.grid_dim, 10);
        assert_eq!(config.input_layer.layer, LayerSpec::new(7, 1));
        assert_eq!(config.input_layer.square_size, 100.0);
        assert_eq!(config.mask_layer, MaskLayerConfig::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FixtureConfig::from_json_file(&dir.path().join("absent.json")).is_err());
    }
}
