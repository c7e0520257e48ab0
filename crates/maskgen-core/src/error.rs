use thiserror::Error;

/// Errors raised while building a layout library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite coordinate ({x}, {y}) in shape on layer {layer}")]
    NonFiniteCoordinate { layer: String, x: f64, y: f64 },

    #[error("Polygon on layer {layer} has {vertices} vertices, at least 3 are required")]
    DegeneratePolygon { layer: String, vertices: usize },

    #[error("Cell '{0}' already exists in the library")]
    DuplicateCell(String),

    #[error("Cell '{0}' is not defined in the library")]
    UndefinedCell(String),

    #[error("Invalid units: user unit {user_unit} m, precision {precision} m")]
    InvalidUnits { user_unit: f64, precision: f64 },

    #[error(transparent)]
    Grid(#[from] crate::grid::GridError),
}
