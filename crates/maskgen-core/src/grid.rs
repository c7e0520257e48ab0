//! Lattice of axis-aligned rectangles for synthetic mask and input layers.
//!
//! Shape `(i, j)` has its lower-left corner at
//! `(origin.x + i * step_x, origin.y + j * step_y)`. Shapes are emitted with
//! the column index `i` outermost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{BBox, Point, Rect};
use crate::layer::LayerSpec;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid {field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Grid origin ({x}, {y}) is not finite")]
    NonFiniteOrigin { x: f64, y: f64 },

    #[error("Grid of {columns} x {rows} shapes is too large to count")]
    TooLarge { columns: usize, rows: usize },
}

/// Parameters of a rectangular grid of rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub origin: Point,
    pub shape_width: f64,
    pub shape_height: f64,
    pub step_x: f64,
    pub step_y: f64,
    pub columns: usize,
    pub rows: usize,
    pub layer: LayerSpec,
}

impl GridSpec {
    /// A `grid_dim` x `grid_dim` grid of squares.
    pub fn square(
        origin: Point,
        shape_size: f64,
        step_size: f64,
        grid_dim: usize,
        layer: LayerSpec,
    ) -> Self {
        Self {
            origin,
            shape_width: shape_size,
            shape_height: shape_size,
            step_x: step_size,
            step_y: step_size,
            columns: grid_dim,
            rows: grid_dim,
            layer,
        }
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if !self.origin.is_finite() {
            return Err(GridError::NonFiniteOrigin {
                x: self.origin.x,
                y: self.origin.y,
            });
        }
        for (field, value) in [
            ("shape width", self.shape_width),
            ("shape height", self.shape_height),
            ("step x", self.step_x),
            ("step y", self.step_y),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GridError::NonPositive { field, value });
            }
        }
        self.checked_shape_count()?;
        if self.shape_width > self.step_x || self.shape_height > self.step_y {
            log::warn!(
                "Grid shapes {}x{} exceed step {}x{}: neighbours will overlap",
                self.shape_width,
                self.shape_height,
                self.step_x,
                self.step_y
            );
        }
        Ok(())
    }

    /// Number of shapes, saturating at `usize::MAX`. A validated grid never
    /// saturates.
    pub fn shape_count(&self) -> usize {
        self.columns.saturating_mul(self.rows)
    }

    pub fn checked_shape_count(&self) -> Result<usize, GridError> {
        self.columns
            .checked_mul(self.rows)
            .ok_or(GridError::TooLarge {
                columns: self.columns,
                rows: self.rows,
            })
    }

    /// Gap between neighbouring shapes along x and y. Negative when they overlap.
    pub fn spacing(&self) -> (f64, f64) {
        (self.step_x - self.shape_width, self.step_y - self.shape_height)
    }

    /// Bounding box of the whole grid, `None` for an empty grid.
    pub fn extent(&self) -> Option<BBox> {
        if self.columns == 0 || self.rows == 0 {
            return None;
        }
        let max_x = self.origin.x + (self.columns - 1) as f64 * self.step_x + self.shape_width;
        let max_y = self.origin.y + (self.rows - 1) as f64 * self.step_y + self.shape_height;
        Some(BBox::new(self.origin, Point::new(max_x, max_y)))
    }

    /// The rectangle at column `i`, row `j`.
    pub fn rect_at(&self, i: usize, j: usize) -> Rect {
        let x = self.origin.x + i as f64 * self.step_x;
        let y = self.origin.y + j as f64 * self.step_y;
        Rect::new(self.layer, x, y, x + self.shape_width, y + self.shape_height)
    }

    /// Validate, then iterate lazily over all rectangles.
    pub fn iter(&self) -> Result<GridIter<'_>, GridError> {
        self.validate()?;
        Ok(GridIter {
            spec: self,
            next: 0,
            total: self.checked_shape_count()?,
        })
    }

    pub fn generate(&self) -> Result<Vec<Rect>, GridError> {
        Ok(self.iter()?.collect())
    }
}

/// Iterator over the rectangles of a [`GridSpec`].
#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    spec: &'a GridSpec,
    next: usize,
    total: usize,
}

impl Iterator for GridIter<'_> {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.next >= self.total {
            return None;
        }
        let i = self.next / self.spec.rows;
        let j = self.next % self.spec.rows;
        self.next += 1;
        Some(self.spec.rect_at(i, j))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter<'_> {}
