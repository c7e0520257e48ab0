//! # maskgen Fixtures
//!
//! Builders for the sample layouts used to exercise pattern-matching tools,
//! and the shared write path the generator binaries use.

pub mod config;

use std::path::Path;

use thiserror::Error;

use maskgen_core::cell::Cell;
use maskgen_core::geometry::{GeomPrimitive, Polygon, Rect};
use maskgen_core::layer::{Layer, LayerSpec};
use maskgen_core::library::{Library, Units};
use maskgen_core::CoreError;
use maskgen_io::{FileEntry, FixtureManifest, IoError, LayoutFormat};
use maskgen_match::{build_hierarchy, cell_layer_and, MatchError};

pub use config::{FixtureConfig, InputLayerConfig, MaskGridConfig, MaskLayerConfig};

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error(transparent)]
    Layout(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("Cannot read config: {0}")]
    File(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

pub const CAPTURE_MASK: LayerSpec = LayerSpec::new(1, 0);
pub const CAPTURE_INPUT: LayerSpec = LayerSpec::new(2, 0);
pub const CAPTURE_RESULT: LayerSpec = LayerSpec::new(3, 0);

/// Install `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

// ── Builders ─────────────────────────────────────────────────────────

pub fn mask_layer(config: &MaskLayerConfig) -> Result<Library, FixtureError> {
    let mut lib = Library::new("MaskLayerLib");
    lib.new_cell(&config.cell_name)?.add_geometry(Rect::new(
        config.layer,
        0.0,
        0.0,
        config.width,
        config.height,
    ))?;
    Ok(lib)
}

pub fn input_layer(config: &InputLayerConfig) -> Result<Library, FixtureError> {
    let mut lib = Library::new("InputLayerLib");
    let added = lib.new_cell(&config.cell_name)?.add_grid(&config.grid())?;
    log::info!("Added {} polygons to {}", added, config.cell_name);
    Ok(lib)
}

/// One square, one rectangle and one triangle on three layer/datatype pairs.
pub fn multi_poly() -> Result<Library, FixtureError> {
    let mut lib = Library::new("MultiPolyLib").with_units(Units::new(1e-6, 1e-9)?);
    let cell = lib.new_cell("MultiPolyCell")?;
    cell.add_geometry(Polygon::from_coords(
        LayerSpec::new(1, 0),
        &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
    ))?;
    cell.add_geometry(Polygon::from_coords(
        LayerSpec::new(2, 1),
        &[(15.0, 0.0), (25.0, 0.0), (25.0, 5.0), (15.0, 5.0)],
    ))?;
    cell.add_geometry(Polygon::from_coords(
        LayerSpec::new(3, 2),
        &[(0.0, 15.0), (5.0, 20.0), (0.0, 20.0)],
    ))?;
    Ok(lib)
}

pub fn simple_rect() -> Result<Library, FixtureError> {
    let mut lib = Library::new("MySimpleLib");
    lib.new_cell("SIMPLE_CELL")?
        .add_geometry(Rect::new(LayerSpec::new(1, 0), 0.0, 0.0, 10.0, 20.0))?;
    Ok(lib)
}

/// Box grid whose coordinates are database units.
pub fn mask_grid(config: &MaskGridConfig) -> Result<Library, FixtureError> {
    let mut lib = Library::new("MaskGridLib").with_units(Units::new(1e-9, 1e-9)?);
    lib.new_cell(&config.cell_name)?.add_grid(&config.grid())?;
    Ok(lib)
}

/// Mask and input rectangles with their AND on a third layer.
pub fn capture_demo() -> Result<Library, FixtureError> {
    let mut cell = Cell::new("CAPTURE");
    cell.add_geometry(Rect::new(CAPTURE_MASK, 0.0, 0.0, 50.0, 50.0))?;
    cell.add_geometry(Rect::new(CAPTURE_INPUT, 25.0, 25.0, 75.0, 75.0))?;

    let result = cell_layer_and(&cell, CAPTURE_MASK, CAPTURE_INPUT, CAPTURE_RESULT)?;
    for (label, layer) in [("Mask", CAPTURE_MASK), ("Input", CAPTURE_INPUT)] {
        for shape in cell.geometries_on_layer(layer) {
            log::info!("{} layer: {}", label, shape.to_polygon().to_wkt());
        }
    }
    for shape in &result {
        log::info!("Result layer (AND): {}", shape.to_polygon().to_wkt());
    }
    for shape in result {
        cell.add_geometry(shape)?;
    }

    let mut lib = Library::new("PatternCaptureLib");
    lib.layer_stack.add_layer(Layer::new("mask", 1, 0));
    lib.layer_stack.add_layer(Layer::new("input", 2, 0));
    lib.layer_stack.add_layer(Layer::new("and", 3, 0).with_description("mask AND input"));
    lib.add_cell(cell)?;
    Ok(lib)
}

/// Three L-shaped clusters of unit squares, `dx` apart.
pub fn l_cluster_layout(dx: f64) -> Result<Cell, FixtureError> {
    let layer = LayerSpec::new(1, 0);
    let mut flat = Cell::new("TOP");
    for origin in [0.0, dx, 2.0 * dx] {
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
            let x = origin + x;
            flat.add_geometry(Rect::new(layer, x, y, x + 1.0, y + 1.0))?;
        }
    }
    Ok(flat)
}

/// The nine-square layout rebuilt as `L_CELL` plus instances.
pub fn hierarchy_demo() -> Result<Library, FixtureError> {
    let flat = l_cluster_layout(3.0)?;
    let mut pattern = Cell::new("PATTERN");
    for shape in flat.geometries.iter().take(3) {
        pattern.add_geometry(shape.clone())?;
    }
    let hierarchy = build_hierarchy(&flat, &pattern, "L_CELL")?;
    Ok(hierarchy.into_library("HierarchyLib", Units::default())?)
}

// ── Output ───────────────────────────────────────────────────────────

/// Write each library to `dir/<file name>` and record them in
/// `dir/<generator>.manifest.json`.
pub fn write_outputs(
    generator: &str,
    dir: &Path,
    outputs: &[(&str, &Library)],
) -> Result<FixtureManifest, FixtureError> {
    let mut manifest = FixtureManifest::new(generator);
    for (file_name, lib) in outputs {
        let path = dir.join(file_name);
        log::info!("Creating {}...", path.display());
        let format: LayoutFormat = maskgen_io::write_library(&path, lib)?;
        manifest.push(FileEntry::describe(Path::new(file_name), format, lib));
    }
    manifest.save(&dir.join(format!("{}.manifest.json", generator)))?;
    Ok(manifest)
}

/// Shapes of `lib` on `layer`, over all cells.
pub fn shapes_on(lib: &Library, layer: LayerSpec) -> Vec<&GeomPrimitive> {
    lib.cells()
        .iter()
        .flat_map(|c| c.geometries_on_layer(layer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskgen_io::read_library;

    #[test]
    fn test_mask_and_input_layers() {
        let mask = mask_layer(&MaskLayerConfig::default()).unwrap();
        let cell = mask.get_cell("MASK_CELL").unwrap();
        assert_eq!(cell.geometry_count(), 1);
        let bbox = cell.local_bbox().unwrap();
        assert_eq!((bbox.max.x, bbox.max.y), (100_000.0, 100_000.0));

        let input = input_layer(&InputLayerConfig::default()).unwrap();
        let cell = input.get_cell("INPUT_CELL").unwrap();
        assert_eq!(cell.geometry_count(), 40_000);
        let first = cell.geometries[0].bbox().unwrap();
        let last = cell.geometries[39_999].bbox().unwrap();
        assert_eq!((first.min.x, first.min.y, first.max.x), (50_000.0, 50_000.0, 50_100.0));
        assert_eq!((last.min.x, last.min.y, last.max.y), (89_800.0, 89_800.0, 89_900.0));
        assert!(shapes_on(&input, LayerSpec::new(2, 0)).len() == 40_000);
    }

    #[test]
    fn test_invalid_input_grid_rejected() {
        let config = InputLayerConfig {
            step_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            input_layer(&config),
            Err(FixtureError::Layout(CoreError::Grid(_)))
        ));
    }

    #[test]
    fn test_mask_grid_uses_database_units() {
        let config = MaskGridConfig {
            columns: 3,
            rows: 2,
            ..Default::default()
        };
        let lib = mask_grid(&config).unwrap();
        assert!((lib.units.dbu_per_user_unit() - 1.0).abs() < 1e-12);
        let cell = lib.get_cell("TOP").unwrap();
        assert_eq!(cell.geometry_count(), 6);
        let last = cell.geometries[5].bbox().unwrap();
        assert_eq!((last.min.x, last.min.y), (2400.0, 1200.0));
        assert_eq!((last.max.x, last.max.y), (3400.0, 2200.0));
    }

    #[test]
    fn test_capture_demo() {
        let lib = capture_demo().unwrap();
        let result = shapes_on(&lib, CAPTURE_RESULT);
        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0].to_polygon().to_wkt(),
            "POLYGON((25 25,50 25,50 50,25 50,25 25))"
        );
        assert_eq!(lib.layer_stack.layer_count(), 3);
    }

    #[test]
    fn test_hierarchy_demo() {
        let lib = hierarchy_demo().unwrap();
        let l_cell = lib.get_cell("L_CELL").unwrap();
        assert_eq!(l_cell.geometry_count(), 3);
        let top = lib.get_cell("TOP").unwrap();
        assert_eq!(top.geometry_count(), 0);
        let xs: Vec<f64> = top.instances.iter().map(|i| i.transform.offset.x).collect();
        assert_eq!(xs, vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_write_outputs_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let multi = multi_poly().unwrap();
        let simple = simple_rect().unwrap();
        let hier = hierarchy_demo().unwrap();

        let manifest = write_outputs(
            "sample",
            dir.path(),
            &[
                ("test_multi_poly.gds", &multi),
                ("simple_test.oas", &simple),
                ("hierarchy.gds", &hier),
            ],
        )
        .unwrap();
        assert_eq!(manifest.files.len(), 3);
        assert_eq!(manifest.files[1].format, LayoutFormat::Oasis);
        assert_eq!(manifest.total_shapes(), 3 + 1 + 3);

        let saved = FixtureManifest::load(&dir.path().join("sample.manifest.json")).unwrap();
        assert_eq!(saved, manifest);

        let back = read_library(&dir.path().join("test_multi_poly.gds")).unwrap();
        assert_eq!(back.name, "MultiPolyLib");
        let layers: Vec<String> = back.used_layers().iter().map(|l| l.to_string()).collect();
        assert_eq!(layers, vec!["1/0", "2/1", "3/2"]);

        let back = read_library(&dir.path().join("simple_test.oas")).unwrap();
        let bbox = back.get_cell("SIMPLE_CELL").unwrap().local_bbox().unwrap();
        assert!((bbox.width() - 10.0).abs() < 1e-10);
        assert!((bbox.height() - 20.0).abs() < 1e-10);

        let back = read_library(&dir.path().join("hierarchy.gds")).unwrap();
        assert_eq!(back.get_cell("TOP").unwrap().instance_count(), 3);
    }
}
