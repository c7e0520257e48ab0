//! # maskgen Match
//!
//! Geometry operations over generated layouts: the layer AND used for
//! pattern capture, shape adjacency graphs, translated subgraph matching,
//! hierarchy reconstruction from a flat cell, and a searchable library of
//! named patterns.

pub mod boolean;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod patterns;

pub use boolean::{cell_layer_and, layer_and};
pub use error::MatchError;
pub use graph::{find_matches, AdjacencyGraph, PatternMatch, ShapeLabel};
pub use hierarchy::{build_hierarchy, Hierarchy};
pub use patterns::{Pattern, PatternLibrary, PatternLibraryError};
