use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::layer::LayerSpec;

/// A 2D point in user units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Closed-interval test: boxes that only touch count as intersecting.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// The overlap region, or `None` when the boxes are disjoint.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BBox::new(
            Point::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            Point::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        ))
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// A rectangle defined by lower-left and upper-right corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub layer: LayerSpec,
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(layer: LayerSpec, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            layer,
            lower_left: Point::new(x1.min(x2), y1.min(y2)),
            upper_right: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn from_bbox(layer: LayerSpec, bbox: &BBox) -> Self {
        Self::new(layer, bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y)
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.lower_left, self.upper_right)
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Corners in counter-clockwise order starting at the lower left.
    pub fn vertices(&self) -> [Point; 4] {
        let (ll, ur) = (self.lower_left, self.upper_right);
        [ll, Point::new(ur.x, ll.y), ur, Point::new(ll.x, ur.y)]
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.layer, self.vertices().to_vec())
    }
}

/// A closed polygon defined by its vertices. The closing edge is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub layer: LayerSpec,
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(layer: LayerSpec, vertices: Vec<Point>) -> Self {
        Self { layer, vertices }
    }

    /// Build from `(x, y)` pairs.
    pub fn from_coords(layer: LayerSpec, coords: &[(f64, f64)]) -> Self {
        Self::new(
            layer,
            coords.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.vertices)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Shoelace area. Positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        acc / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// True when every turn has the same orientation. Collinear vertices are allowed.
    pub fn is_convex(&self) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut sign = 0.0_f64;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let c = self.vertices[(i + 2) % n];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if cross.abs() < f64::EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        sign != 0.0
    }

    /// Check if the polygon is a 4-vertex axis-aligned rectangle.
    pub fn is_axis_aligned_rect(&self) -> bool {
        if self.vertices.len() != 4 {
            return false;
        }
        let v = &self.vertices;
        let horizontal_first = (0..4).all(|i| {
            let (a, b) = (v[i], v[(i + 1) % 4]);
            if i % 2 == 0 { a.y == b.y && a.x != b.x } else { a.x == b.x && a.y != b.y }
        });
        let vertical_first = (0..4).all(|i| {
            let (a, b) = (v[i], v[(i + 1) % 4]);
            if i % 2 == 0 { a.x == b.x && a.y != b.y } else { a.y == b.y && a.x != b.x }
        });
        horizontal_first || vertical_first
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            layer: self.layer,
            vertices: self.vertices.iter().map(|p| p.translate(dx, dy)).collect(),
        }
    }

    /// Well-known-text rendering, closing ring included.
    pub fn to_wkt(&self) -> String {
        let mut ring: Vec<String> = self
            .vertices
            .iter()
            .map(|p| format!("{} {}", p.x, p.y))
            .collect();
        if let Some(first) = self.vertices.first() {
            ring.push(format!("{} {}", first.x, first.y));
        }
        format!("POLYGON(({}))", ring.join(","))
    }
}

/// A geometric primitive in the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeomPrimitive {
    Rect(Rect),
    Polygon(Polygon),
}

impl GeomPrimitive {
    pub fn bbox(&self) -> Option<BBox> {
        match self {
            GeomPrimitive::Rect(r) => Some(r.bbox()),
            GeomPrimitive::Polygon(p) => p.bbox(),
        }
    }

    pub fn layer(&self) -> LayerSpec {
        match self {
            GeomPrimitive::Rect(r) => r.layer,
            GeomPrimitive::Polygon(p) => p.layer,
        }
    }

    /// Boundary vertices without the closing point.
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            GeomPrimitive::Rect(r) => r.vertices().to_vec(),
            GeomPrimitive::Polygon(p) => p.vertices.clone(),
        }
    }

    pub fn to_polygon(&self) -> Polygon {
        match self {
            GeomPrimitive::Rect(r) => r.to_polygon(),
            GeomPrimitive::Polygon(p) => p.clone(),
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        match self {
            GeomPrimitive::Rect(r) => GeomPrimitive::Rect(Rect::new(
                r.layer,
                r.lower_left.x + dx,
                r.lower_left.y + dy,
                r.upper_right.x + dx,
                r.upper_right.y + dy,
            )),
            GeomPrimitive::Polygon(p) => GeomPrimitive::Polygon(p.translate(dx, dy)),
        }
    }

    /// Reject non-finite coordinates and polygons with fewer than 3 vertices.
    pub fn validate(&self) -> Result<(), CoreError> {
        let layer = self.layer();
        if let GeomPrimitive::Polygon(p) = self {
            if p.vertices.len() < 3 {
                return Err(CoreError::DegeneratePolygon {
                    layer: layer.to_string(),
                    vertices: p.vertices.len(),
                });
            }
        }
        match self.vertices().into_iter().find(|p| !p.is_finite()) {
            Some(bad) => Err(CoreError::NonFiniteCoordinate {
                layer: layer.to_string(),
                x: bad.x,
                y: bad.y,
            }),
            None => Ok(()),
        }
    }
}

impl From<Rect> for GeomPrimitive {
    fn from(rect: Rect) -> Self {
        GeomPrimitive::Rect(rect)
    }
}

impl From<Polygon> for GeomPrimitive {
    fn from(poly: Polygon) -> Self {
        GeomPrimitive::Polygon(poly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L1: LayerSpec = LayerSpec::new(1, 0);

    #[test]
    fn test_rect_area() {
        let r = Rect::new(L1, 0.0, 0.0, 10.0, 5.0);
        assert!((r.area() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::new(L1, 10.0, 20.0, 0.0, 0.0);
        assert_eq!(r.lower_left, Point::new(0.0, 0.0));
        assert_eq!(r.upper_right, Point::new(10.0, 20.0));
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let b = BBox::new(Point::new(5.0, 5.0), Point::new(15.0, 15.0));
        let c = BBox::new(Point::new(20.0, 20.0), Point::new(30.0, 30.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap.min, Point::new(5.0, 5.0));
        assert_eq!(overlap.max, Point::new(10.0, 10.0));
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_triangle_area_and_convexity() {
        let tri = Polygon::from_coords(L1, &[(0.0, 15.0), (5.0, 20.0), (0.0, 20.0)]);
        assert!((tri.area() - 12.5).abs() < 1e-10);
        assert!(tri.is_convex());
    }

    #[test]
    fn test_l_shape_is_not_convex() {
        let l = Polygon::from_coords(
            L1,
            &[(0.0, 0.0), (200.0, 0.0), (200.0, 100.0), (100.0, 100.0), (100.0, 200.0), (0.0, 200.0)],
        );
        assert!(!l.is_convex());
        assert!((l.area() - 30000.0).abs() < 1e-10);
    }

    #[test]
    fn test_axis_aligned_rect_detection() {
        let square = Polygon::from_coords(L1, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert!(square.is_axis_aligned_rect());
        let skew = Polygon::from_coords(L1, &[(0.0, 0.0), (10.0, 0.0), (12.0, 10.0), (0.0, 10.0)]);
        assert!(!skew.is_axis_aligned_rect());
    }

    #[test]
    fn test_validate_rejects_nan_and_degenerate() {
        let bad = GeomPrimitive::Rect(Rect::new(L1, 0.0, 0.0, f64::INFINITY, 1.0));
        assert!(matches!(bad.validate(), Err(CoreError::NonFiniteCoordinate { .. })));

        let nan = GeomPrimitive::Polygon(Polygon::from_coords(
            L1,
            &[(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0)],
        ));
        assert!(matches!(nan.validate(), Err(CoreError::NonFiniteCoordinate { .. })));

        let line = GeomPrimitive::Polygon(Polygon::from_coords(L1, &[(0.0, 0.0), (1.0, 1.0)]));
        assert!(matches!(
            line.validate(),
            Err(CoreError::DegeneratePolygon { vertices: 2, .. })
        ));
    }

    #[test]
    fn test_wkt() {
        let r = Rect::new(L1, 25.0, 25.0, 50.0, 50.0).to_polygon();
        assert_eq!(r.to_wkt(), "POLYGON((25 25,50 25,50 50,25 50,25 25))");
    }
}
