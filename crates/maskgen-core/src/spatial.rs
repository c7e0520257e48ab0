use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{BBox, GeomPrimitive};

/// An entry in the R-tree spatial index, referencing a geometry by its index.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index into the shape slice the index was built from.
    pub geometry_index: usize,
    /// Bounding box of the geometry.
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Spatial index over shape bounding boxes for overlap and adjacency queries.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    /// Build the index from a list of geometry bounding boxes.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Bulk-load one entry per shape. Shapes without a bounding box are skipped.
    pub fn from_geometries(geometries: &[GeomPrimitive]) -> Self {
        let entries = geometries
            .iter()
            .enumerate()
            .filter_map(|(geometry_index, g)| {
                g.bbox().map(|bbox| SpatialEntry {
                    geometry_index,
                    bbox,
                })
            })
            .collect();
        Self::build(entries)
    }

    /// Find all entries whose bounding box intersects (or touches) `region`.
    pub fn query_bbox(&self, region: &BBox) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_corners(
            [region.min.x, region.min.y],
            [region.max.x, region.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }

    /// Sorted geometry indices intersecting `region`.
    pub fn indices_in(&self, region: &BBox) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .query_bbox(region)
            .into_iter()
            .map(|e| e.geometry_index)
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
