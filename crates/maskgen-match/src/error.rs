use thiserror::Error;

use maskgen_core::CoreError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    /// Mask shape `mask` and input shape `input` overlap and neither is convex.
    #[error("Cannot intersect mask shape {mask} with input shape {input}: neither operand is convex")]
    NonConvexOperands { mask: usize, input: usize },

    #[error("Pattern cell '{0}' has no shapes")]
    EmptyPattern(String),

    #[error(transparent)]
    Layout(#[from] CoreError),
}
