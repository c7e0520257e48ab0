//! Layer AND: the area covered by both a mask layer and an input layer.
//!
//! Candidate pairs come from an R-tree over the input shapes. Rectangle
//! pairs intersect exactly; any other pair is clipped with
//! Sutherland-Hodgman, which needs at least one convex operand. A
//! non-convex subject whose clipped ring folds onto itself is cut into
//! horizontal slabs first, so disconnected overlaps come out as separate
//! polygons.

use maskgen_core::cell::Cell;
use maskgen_core::geometry::{BBox, GeomPrimitive, Point, Polygon, Rect};
use maskgen_core::layer::LayerSpec;
use maskgen_core::spatial::SpatialIndex;

use crate::error::MatchError;

const EPS: f64 = 1e-12;

/// Intersect every mask shape with every input shape it overlaps.
///
/// Results are placed on `out_layer`, ordered by mask index and then by
/// input index. Pairs that only touch produce nothing.
pub fn layer_and(
    mask: &[GeomPrimitive],
    input: &[GeomPrimitive],
    out_layer: LayerSpec,
) -> Result<Vec<GeomPrimitive>, MatchError> {
    let index = SpatialIndex::from_geometries(input);
    let mut result = Vec::new();

    for (mask_idx, mask_shape) in mask.iter().enumerate() {
        let Some(bbox) = mask_shape.bbox() else {
            continue;
        };
        for input_idx in index.indices_in(&bbox) {
            let pieces = intersect_pair(mask_shape, &input[input_idx], out_layer)
                .ok_or(MatchError::NonConvexOperands {
                    mask: mask_idx,
                    input: input_idx,
                })?;
            result.extend(pieces);
        }
    }

    log::debug!(
        "Layer AND: {} mask x {} input shapes -> {} on {}",
        mask.len(),
        input.len(),
        result.len(),
        out_layer
    );
    Ok(result)
}

/// AND two layers of one cell.
pub fn cell_layer_and(
    cell: &Cell,
    mask_layer: LayerSpec,
    input_layer: LayerSpec,
    out_layer: LayerSpec,
) -> Result<Vec<GeomPrimitive>, MatchError> {
    let on_layer = |layer: LayerSpec| -> Vec<GeomPrimitive> {
        cell.geometries_on_layer(layer).into_iter().cloned().collect()
    };
    layer_and(&on_layer(mask_layer), &on_layer(input_layer), out_layer)
}

/// `None` when neither shape is convex. An empty overlap is an empty list.
fn intersect_pair(
    a: &GeomPrimitive,
    b: &GeomPrimitive,
    out_layer: LayerSpec,
) -> Option<Vec<GeomPrimitive>> {
    if let (GeomPrimitive::Rect(ra), GeomPrimitive::Rect(rb)) = (a, b) {
        let overlap = rect_overlap(&ra.bbox(), &rb.bbox());
        return Some(
            overlap
                .map(|bbox| Rect::from_bbox(out_layer, &bbox).into())
                .into_iter()
                .collect(),
        );
    }

    let pa = a.to_polygon();
    let pb = b.to_polygon();
    let (subject, clip) = if pb.is_convex() {
        (pa, pb)
    } else if pa.is_convex() {
        (pb, pa)
    } else {
        return None;
    };

    let ring = dedup_ring(clip_convex(&subject.vertices, &clip));
    if subject.is_convex() || is_simple_ring(&ring) {
        return Some(finish_piece(ring, out_layer).into_iter().collect());
    }

    log::trace!(
        "Clipped ring of {} points folds onto itself, splitting into slabs",
        ring.len()
    );
    Some(
        slab_pieces(&subject.vertices)
            .into_iter()
            .filter_map(|piece| finish_piece(dedup_ring(clip_convex(&piece, &clip)), out_layer))
            .collect(),
    )
}

fn finish_piece(ring: Vec<Point>, out_layer: LayerSpec) -> Option<GeomPrimitive> {
    let poly = Polygon::new(out_layer, ring);
    if poly.vertex_count() < 3 || poly.area() <= EPS {
        return None;
    }
    Some(poly.into())
}

/// Cut a simple polygon into convex trapezoids between consecutive vertex
/// heights. Every edge that reaches into a slab spans it completely, so the
/// crossings inside a slab pair up left to right.
fn slab_pieces(vertices: &[Point]) -> Vec<Vec<Point>> {
    let mut heights: Vec<f64> = vertices.iter().map(|p| p.y).collect();
    heights.sort_by(f64::total_cmp);
    heights.dedup();

    let n = vertices.len();
    let mut pieces = Vec::new();
    for band in heights.windows(2) {
        let (y0, y1) = (band[0], band[1]);
        let mid = (y0 + y1) / 2.0;

        let mut crossings: Vec<(f64, f64, f64)> = Vec::new();
        for i in 0..n {
            let (p, q) = (vertices[i], vertices[(i + 1) % n]);
            if p.y == q.y || p.y.min(q.y) > y0 || p.y.max(q.y) < y1 {
                continue;
            }
            let x_at = |y: f64| p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y);
            crossings.push((x_at(mid), x_at(y0), x_at(y1)));
        }
        crossings.sort_by(|l, r| l.0.total_cmp(&r.0));

        for pair in crossings.chunks_exact(2) {
            let (left, right) = (pair[0], pair[1]);
            pieces.push(dedup_ring(vec![
                Point::new(left.1, y0),
                Point::new(right.1, y0),
                Point::new(right.2, y1),
                Point::new(left.2, y1),
            ]));
        }
    }
    pieces
}

/// A ring is simple when no two edges meet except consecutive ones at their
/// shared vertex.
fn is_simple_ring(ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return true;
    }
    let edge = |i: usize| (ring[i], ring[(i + 1) % n]);

    for i in 0..n {
        let (a, b) = edge(i);
        let (_, c) = edge((i + 1) % n);
        // consecutive edges folding back over each other
        if orientation(a, b, c) == 0 && (b.x - a.x) * (c.x - b.x) + (b.y - a.y) * (c.y - b.y) < 0.0
        {
            return false;
        }
        for j in i + 2..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (p, q) = edge(j);
            if segments_meet(a, b, p, q) {
                return false;
            }
        }
    }
    true
}

/// Sign of the turn `o -> a -> b`, zero within a tolerance scaled to the
/// segment lengths.
fn orientation(o: Point, a: Point, b: Point) -> i8 {
    let value = cross(o, a, b);
    let scale = ((a.x - o.x).hypot(a.y - o.y) * (b.x - o.x).hypot(b.y - o.y)).max(1.0);
    if value.abs() <= 1e-9 * scale {
        0
    } else if value > 0.0 {
        1
    } else {
        -1
    }
}

fn within_span(a: Point, b: Point, p: Point) -> bool {
    let tol = 1e-9;
    p.x >= a.x.min(b.x) - tol
        && p.x <= a.x.max(b.x) + tol
        && p.y >= a.y.min(b.y) - tol
        && p.y <= a.y.max(b.y) + tol
}

fn segments_meet(a: Point, b: Point, p: Point, q: Point) -> bool {
    let d1 = orientation(p, q, a);
    let d2 = orientation(p, q, b);
    let d3 = orientation(a, b, p);
    let d4 = orientation(a, b, q);
    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }
    (d1 == 0 && within_span(p, q, a))
        || (d2 == 0 && within_span(p, q, b))
        || (d3 == 0 && within_span(a, b, p))
        || (d4 == 0 && within_span(a, b, q))
}

fn rect_overlap(a: &BBox, b: &BBox) -> Option<BBox> {
    a.intersection(b).filter(|o| o.width() > 0.0 && o.height() > 0.0)
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Clip `subject` against the convex polygon `clip`.
fn clip_convex(subject: &[Point], clip: &Polygon) -> Vec<Point> {
    let orientation = clip.signed_area().signum();
    let edges = &clip.vertices;
    let mut output = subject.to_vec();

    for i in 0..edges.len() {
        let (a, b) = (edges[i], edges[(i + 1) % edges.len()]);
        if a == b {
            continue;
        }
        let inside = |p: Point| cross(a, b, p) * orientation >= -EPS;
        let input = std::mem::take(&mut output);
        let Some(&last) = input.last() else {
            break;
        };

        let mut prev = last;
        for &cur in &input {
            match (inside(prev), inside(cur)) {
                (true, true) => output.push(cur),
                (true, false) => output.push(line_crossing(prev, cur, a, b)),
                (false, true) => {
                    output.push(line_crossing(prev, cur, a, b));
                    output.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }
    output
}

/// Where segment `p`-`q` crosses the infinite line through `a` and `b`.
fn line_crossing(p: Point, q: Point, a: Point, b: Point) -> Point {
    let (ex, ey) = (b.x - a.x, b.y - a.y);
    let (dx, dy) = (q.x - p.x, q.y - p.y);
    let denom = ex * dy - ey * dx;
    if denom.abs() < EPS {
        return q;
    }
    let t = (ex * (a.y - p.y) - ey * (a.x - p.x)) / denom;
    Point::new(p.x + t * dx, p.y + t * dy)
}

fn dedup_ring(mut points: Vec<Point>) -> Vec<Point> {
    let same = |a: &Point, b: &Point| (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9;
    points.dedup_by(|a, b| same(a, b));
    while points.len() > 1 && same(&points[0], &points[points.len() - 1]) {
        points.pop();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: LayerSpec = LayerSpec::new(1, 0);
    const INPUT: LayerSpec = LayerSpec::new(2, 0);
    const OUT: LayerSpec = LayerSpec::new(100, 0);

    fn l_shape(layer: LayerSpec, dx: f64) -> GeomPrimitive {
        Polygon::from_coords(
            layer,
            &[(0.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0), (10.0, 20.0), (0.0, 20.0)],
        )
        .translate(dx, 0.0)
        .into()
    }

    #[test]
    fn test_rect_and_rect() {
        let mask: Vec<GeomPrimitive> = vec![Rect::new(MASK, 0.0, 0.0, 50.0, 50.0).into()];
        let input: Vec<GeomPrimitive> = vec![Rect::new(INPUT, 25.0, 25.0, 75.0, 75.0).into()];
        let result = layer_and(&mask, &input, OUT).unwrap();
        assert_eq!(result.len(), 1);
        match &result[0] {
            GeomPrimitive::Rect(r) => {
                assert_eq!(r.layer, OUT);
                assert_eq!((r.lower_left.x, r.lower_left.y), (25.0, 25.0));
                assert_eq!((r.upper_right.x, r.upper_right.y), (50.0, 50.0));
                assert_eq!(
                    r.to_polygon().to_wkt(),
                    "POLYGON((25 25,50 25,50 50,25 50,25 25))"
                );
            }
            other => panic!("expected rectangle, got {:?}", other),
        }
    }

    #[test]
    fn test_touching_and_disjoint_give_nothing() {
        let mask: Vec<GeomPrimitive> = vec![Rect::new(MASK, 0.0, 0.0, 10.0, 10.0).into()];
        let input: Vec<GeomPrimitive> = vec![
            Rect::new(INPUT, 10.0, 0.0, 20.0, 10.0).into(),
            Rect::new(INPUT, 30.0, 30.0, 40.0, 40.0).into(),
            Polygon::from_coords(INPUT, &[(10.0, 10.0), (15.0, 10.0), (15.0, 15.0)]).into(),
        ];
        assert!(layer_and(&mask, &input, OUT).unwrap().is_empty());
    }

    #[test]
    fn test_triangle_clipped_by_rect() {
        let triangle = Polygon::from_coords(MASK, &[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let mask: Vec<GeomPrimitive> = vec![triangle.into()];
        let input: Vec<GeomPrimitive> = vec![Rect::new(INPUT, 0.0, 0.0, 5.0, 5.0).into()];
        let result = layer_and(&mask, &input, OUT).unwrap();
        assert_eq!(result.len(), 1);
        let poly = result[0].to_polygon();
        // the hypotenuse x + y = 10 passes through the square's far corner
        assert!((poly.area() - 25.0).abs() < 1e-10);
        assert_eq!(poly.layer, OUT);
    }

    #[test]
    fn test_non_convex_subject_with_convex_clip() {
        let mask: Vec<GeomPrimitive> = vec![l_shape(MASK, 0.0)];
        let input: Vec<GeomPrimitive> = vec![Rect::new(INPUT, 5.0, 5.0, 15.0, 15.0).into()];
        let result = layer_and(&mask, &input, OUT).unwrap();
        assert_eq!(result.len(), 1);
        // the square minus the L's missing quadrant
        assert!((result[0].to_polygon().area() - 75.0).abs() < 1e-10);
    }

    fn u_shape(layer: LayerSpec) -> GeomPrimitive {
        Polygon::from_coords(
            layer,
            &[
                (0.0, 0.0),
                (30.0, 0.0),
                (30.0, 30.0),
                (20.0, 30.0),
                (20.0, 10.0),
                (10.0, 10.0),
                (10.0, 30.0),
                (0.0, 30.0),
            ],
        )
        .into()
    }

    #[test]
    fn test_bar_across_u_arms_gives_two_pieces() {
        let mask: Vec<GeomPrimitive> = vec![u_shape(MASK)];
        let input: Vec<GeomPrimitive> = vec![Rect::new(INPUT, 0.0, 20.0, 30.0, 25.0).into()];
        let result = layer_and(&mask, &input, OUT).unwrap();
        assert_eq!(result.len(), 2);

        let mut spans: Vec<(f64, f64)> = result
            .iter()
            .map(|g| {
                let bbox = g.bbox().unwrap();
                (bbox.min.x, bbox.max.x)
            })
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(spans, vec![(0.0, 10.0), (20.0, 30.0)]);
        for piece in &result {
            assert_eq!(piece.layer(), OUT);
            assert!((piece.to_polygon().area() - 50.0).abs() < 1e-10);
            let bbox = piece.bbox().unwrap();
            assert_eq!((bbox.min.y, bbox.max.y), (20.0, 25.0));
        }
    }

    #[test]
    fn test_bar_through_u_base_stays_one_piece() {
        let mask: Vec<GeomPrimitive> = vec![u_shape(MASK)];
        let input: Vec<GeomPrimitive> = vec![Rect::new(INPUT, 0.0, 2.0, 30.0, 8.0).into()];
        let result = layer_and(&mask, &input, OUT).unwrap();
        assert_eq!(result.len(), 1);
        assert!((result[0].to_polygon().area() - 180.0).abs() < 1e-10);
    }

    #[test]
    fn test_slab_pieces_cover_the_polygon() {
        let u = u_shape(MASK).to_polygon();
        let pieces = slab_pieces(&u.vertices);
        assert_eq!(pieces.len(), 3);
        let total: f64 = pieces
            .into_iter()
            .map(|piece| Polygon::new(MASK, piece).area())
            .sum();
        assert!((total - u.area()).abs() < 1e-10);
    }

    #[test]
    fn test_folded_ring_is_not_simple() {
        let folded: Vec<Point> = [
            (0.0, 25.0),
            (0.0, 20.0),
            (30.0, 20.0),
            (30.0, 25.0),
            (20.0, 25.0),
            (20.0, 20.0),
            (10.0, 20.0),
            (10.0, 25.0),
        ]
        .iter()
        .map(|&(x, y)| Point::new(x, y))
        .collect();
        assert!(!is_simple_ring(&folded));

        let square = Rect::new(OUT, 0.0, 0.0, 5.0, 5.0).vertices();
        assert!(is_simple_ring(&square));
    }

    #[test]
    fn test_two_non_convex_operands_rejected() {
        let mask: Vec<GeomPrimitive> = vec![
            Rect::new(MASK, 100.0, 100.0, 110.0, 110.0).into(),
            l_shape(MASK, 0.0),
        ];
        let input: Vec<GeomPrimitive> = vec![l_shape(INPUT, 5.0)];
        assert_eq!(
            layer_and(&mask, &input, OUT).unwrap_err(),
            MatchError::NonConvexOperands { mask: 1, input: 0 }
        );
    }

    #[test]
    fn test_output_order_follows_mask_then_input() {
        let mask: Vec<GeomPrimitive> = vec![
            Rect::new(MASK, 0.0, 0.0, 10.0, 10.0).into(),
            Rect::new(MASK, 100.0, 0.0, 110.0, 10.0).into(),
        ];
        let input: Vec<GeomPrimitive> = vec![
            Rect::new(INPUT, 105.0, 0.0, 120.0, 5.0).into(),
            Rect::new(INPUT, 5.0, 5.0, 15.0, 15.0).into(),
            Rect::new(INPUT, -5.0, -5.0, 2.0, 2.0).into(),
        ];
        let xs: Vec<f64> = layer_and(&mask, &input, OUT)
            .unwrap()
            .iter()
            .map(|g| g.bbox().unwrap().min.x)
            .collect();
        assert_eq!(xs, vec![5.0, 0.0, 105.0]);
    }

    #[test]
    fn test_cell_layer_and() {
        let mut cell = Cell::new("CAPTURE");
        cell.add_geometry(Rect::new(MASK, 0.0, 0.0, 50.0, 50.0)).unwrap();
        cell.add_geometry(Rect::new(INPUT, 25.0, 25.0, 75.0, 75.0)).unwrap();
        let result = cell_layer_and(&cell, MASK, INPUT, OUT).unwrap();
        assert_eq!(result.len(), 1);
        assert!((result[0].to_polygon().area() - 625.0).abs() < 1e-10);
    }
}
