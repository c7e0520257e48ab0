//! Shape adjacency graphs and translated subgraph matching.

use std::collections::BTreeSet;

use maskgen_core::geometry::{BBox, GeomPrimitive, Point};
use maskgen_core::layer::LayerSpec;
use maskgen_core::spatial::{SpatialEntry, SpatialIndex};

/// Coordinate tolerance for label and translation comparisons.
const TOLERANCE: f64 = 1e-9;

/// Shape identity under translation: the layer plus every vertex relative
/// to the bounding-box lower-left, snapped to a 1e-6 grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeLabel {
    pub layer: LayerSpec,
    pub offsets: Vec<(i64, i64)>,
}

impl ShapeLabel {
    fn of(shape: &GeomPrimitive, bbox: &BBox) -> Self {
        let snap = |v: f64| (v * 1e6).round() as i64;
        Self {
            layer: shape.layer(),
            offsets: shape
                .vertices()
                .iter()
                .map(|p| (snap(p.x - bbox.min.x), snap(p.y - bbox.min.y)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Index of the shape in the slice the graph was built from.
    pub shape: usize,
    pub label: ShapeLabel,
    pub bbox: BBox,
}

/// Undirected graph over shapes. Two shapes are adjacent when their
/// bounding boxes overlap or share a boundary segment of positive length.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyGraph {
    nodes: Vec<Node>,
    neighbors: Vec<BTreeSet<usize>>,
}

impl AdjacencyGraph {
    pub fn from_shapes(shapes: &[GeomPrimitive]) -> Self {
        let nodes: Vec<Node> = shapes
            .iter()
            .enumerate()
            .filter_map(|(shape, g)| {
                g.bbox().map(|bbox| Node {
                    shape,
                    label: ShapeLabel::of(g, &bbox),
                    bbox,
                })
            })
            .collect();

        let index = node_index(&nodes);
        let mut neighbors = vec![BTreeSet::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for j in index.indices_in(&node.bbox) {
                if j != i && touches_along_edge(&node.bbox, &nodes[j].bbox) {
                    neighbors[i].insert(j);
                }
            }
        }

        let graph = Self { nodes, neighbors };
        log::debug!(
            "Adjacency graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors[node].iter().copied()
    }

    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        self.neighbors[a].contains(&b)
    }
}

fn node_index(nodes: &[Node]) -> SpatialIndex {
    SpatialIndex::build(
        nodes
            .iter()
            .enumerate()
            .map(|(geometry_index, n)| SpatialEntry {
                geometry_index,
                bbox: n.bbox,
            })
            .collect(),
    )
}

/// Overlap, or a shared boundary segment. A shared corner alone does not count.
fn touches_along_edge(a: &BBox, b: &BBox) -> bool {
    match a.intersection(b) {
        Some(common) => common.width() > TOLERANCE || common.height() > TOLERANCE,
        None => false,
    }
}

/// One occurrence of a pattern inside a target graph.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Target shape index for each pattern node, in pattern node order.
    pub mapping: Vec<usize>,
    /// Translation taking the pattern onto the target occurrence.
    pub offset: Point,
}

impl PatternMatch {
    /// The matched target shapes, ascending.
    pub fn shape_set(&self) -> BTreeSet<usize> {
        self.mapping.iter().copied().collect()
    }
}

/// Find every translated occurrence of `pattern` in `target`.
///
/// Nodes must carry equal labels, every pattern edge must map to a target
/// edge, and all nodes share one translation. Each distinct set of target
/// shapes is reported once, ordered by its smallest shape index.
pub fn find_matches(pattern: &AdjacencyGraph, target: &AdjacencyGraph) -> Vec<PatternMatch> {
    if pattern.node_count() == 0 {
        return Vec::new();
    }

    let mut search = Search {
        pattern,
        target,
        index: node_index(&target.nodes),
        core: Vec::with_capacity(pattern.node_count()),
        used: vec![false; target.node_count()],
        offset: Point::new(0.0, 0.0),
        found: Vec::new(),
    };

    let anchor = &pattern.nodes[0];
    for (t, node) in target.nodes.iter().enumerate() {
        if node.label != anchor.label {
            continue;
        }
        search.offset = Point::new(
            node.bbox.min.x - anchor.bbox.min.x,
            node.bbox.min.y - anchor.bbox.min.y,
        );
        search.push(t);
        search.extend();
        search.pop(t);
    }

    let mut seen = BTreeSet::new();
    let mut matches: Vec<PatternMatch> = search
        .found
        .into_iter()
        .filter(|m| seen.insert(m.shape_set()))
        .collect();
    matches.sort_by_key(|m| m.shape_set().into_iter().collect::<Vec<_>>());

    log::debug!(
        "Pattern of {} shapes: {} matches in {} target shapes",
        pattern.node_count(),
        matches.len(),
        target.node_count()
    );
    matches
}

/// Backtracking state: `core[k]` is the target node paired with pattern node `k`.
struct Search<'a> {
    pattern: &'a AdjacencyGraph,
    target: &'a AdjacencyGraph,
    index: SpatialIndex,
    core: Vec<usize>,
    used: Vec<bool>,
    offset: Point,
    found: Vec<PatternMatch>,
}

impl Search<'_> {
    fn push(&mut self, t: usize) {
        self.core.push(t);
        self.used[t] = true;
    }

    fn pop(&mut self, t: usize) {
        self.core.pop();
        self.used[t] = false;
    }

    fn extend(&mut self) {
        let next = self.core.len();
        if next == self.pattern.node_count() {
            self.found.push(PatternMatch {
                mapping: self.core.iter().map(|&t| self.target.nodes[t].shape).collect(),
                offset: self.offset,
            });
            return;
        }

        // The translation pins the candidate's lower-left corner.
        let p = &self.pattern.nodes[next];
        let corner = p.bbox.min.translate(self.offset.x, self.offset.y);
        let window = BBox::new(
            corner.translate(-TOLERANCE, -TOLERANCE),
            corner.translate(TOLERANCE, TOLERANCE),
        );
        for t in self.index.indices_in(&window) {
            if self.is_feasible(next, t) {
                self.push(t);
                self.extend();
                self.pop(t);
            }
        }
    }

    fn is_feasible(&self, p: usize, t: usize) -> bool {
        if self.used[t] || self.pattern.nodes[p].label != self.target.nodes[t].label {
            return false;
        }
        let expected = self.pattern.nodes[p].bbox.min.translate(self.offset.x, self.offset.y);
        let actual = self.target.nodes[t].bbox.min;
        if (expected.x - actual.x).abs() > TOLERANCE || (expected.y - actual.y).abs() > TOLERANCE {
            return false;
        }
        self.pattern
            .neighbors(p)
            .filter(|&q| q < self.core.len())
            .all(|q| self.target.is_adjacent(t, self.core[q]))
    }
}
