//! # maskgen Core
//!
//! Layout data model for generated test masks: geometric primitives tagged
//! with layer/datatype pairs, cells, libraries with unit scaling, the grid
//! geometry generator, and an R-tree spatial index over shapes.

pub mod cell;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod layer;
pub mod library;
pub mod spatial;

pub use cell::{Cell, CellInstance, Transform};
pub use error::CoreError;
pub use geometry::{BBox, GeomPrimitive, Point, Polygon, Rect};
pub use grid::{GridError, GridSpec};
pub use layer::{Layer, LayerSpec, LayerStack};
pub use library::{Library, Units};
pub use spatial::SpatialIndex;
