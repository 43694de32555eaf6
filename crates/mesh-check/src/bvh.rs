//! Bounding volume hierarchy over triangle boxes.
//!
//! Shared by the self-intersection detector and the cross-mesh intersector.
//! The tree is built once, then queried read-only from many threads.

use nalgebra::Point3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// An inverted box that any `expand` call replaces.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Box around three points.
    pub fn from_triangle(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> Self {
        Self {
            min: Point3::new(
                v0.x.min(v1.x).min(v2.x),
                v0.y.min(v1.y).min(v2.y),
                v0.z.min(v1.z).min(v2.z),
            ),
            max: Point3::new(
                v0.x.max(v1.x).max(v2.x),
                v0.y.max(v1.y).max(v2.y),
                v0.z.max(v1.z).max(v2.z),
            ),
        }
    }

    /// Grow to enclose `other`.
    pub fn expand(&mut self, other: &Aabb) {
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.min.z = self.min.z.min(other.min.z);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
        self.max.z = self.max.z.max(other.max.z);
    }

    /// Overlap test, treating boxes closer than `tolerance` as touching.
    #[inline]
    pub fn intersects(&self, other: &Aabb, tolerance: f64) -> bool {
        !(self.max.x + tolerance < other.min.x
            || other.max.x + tolerance < self.min.x
            || self.max.y + tolerance < other.min.y
            || other.max.y + tolerance < self.min.y
            || self.max.z + tolerance < other.min.z
            || other.max.z + tolerance < self.min.z)
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Index of the longest extent (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let dx = self.max.x - self.min.x;
        let dy = self.max.y - self.min.y;
        let dz = self.max.z - self.min.z;
        if dx >= dy && dx >= dz {
            0
        } else if dy >= dz {
            1
        } else {
            2
        }
    }

    /// Check that every bound is a finite number.
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|c| c.is_finite())
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        items: Vec<(usize, Aabb)>,
    },
    Internal {
        bbox: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

/// Median-split BVH over a set of item boxes.
///
/// Items are identified by the caller's own indices. Items with non-finite
/// boxes are left out of the tree and never returned by queries.
#[derive(Debug)]
pub struct Bvh {
    root: Option<BvhNode>,
    len: usize,
}

impl Bvh {
    /// Build a tree over `(item, box)` pairs.
    pub fn build(items: impl IntoIterator<Item = (usize, Aabb)>, max_leaf_size: usize) -> Self {
        let entries: Vec<(usize, Aabb)> = items
            .into_iter()
            .filter(|(_, bbox)| bbox.is_finite())
            .collect();
        let len = entries.len();

        if entries.is_empty() {
            return Self { root: None, len };
        }

        let indices: Vec<usize> = (0..entries.len()).collect();
        let root = Self::build_recursive(&entries, indices, max_leaf_size.max(1));

        Self {
            root: Some(root),
            len,
        }
    }

    fn build_recursive(
        entries: &[(usize, Aabb)],
        indices: Vec<usize>,
        max_leaf_size: usize,
    ) -> BvhNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand(&entries[i].1);
        }

        if indices.len() <= max_leaf_size {
            return BvhNode::Leaf {
                bbox,
                items: indices.iter().map(|&i| entries[i]).collect(),
            };
        }

        let axis = bbox.longest_axis();
        let mut sorted = indices;
        sorted.sort_by(|&a, &b| {
            let ca = entries[a].1.center()[axis];
            let cb = entries[b].1.center()[axis];
            ca.total_cmp(&cb)
        });

        let right_indices = sorted.split_off(sorted.len() / 2);
        let left = Self::build_recursive(entries, sorted, max_leaf_size);
        let right = Self::build_recursive(entries, right_indices, max_leaf_size);

        BvhNode::Internal {
            bbox,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Number of items stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Collect every item whose box overlaps `query` within `tolerance`.
    pub fn query(&self, query: &Aabb, tolerance: f64) -> Vec<usize> {
        let mut result = Vec::new();
        if let Some(ref root) = self.root {
            Self::query_recursive(root, query, tolerance, &mut result);
        }
        result
    }

    fn query_recursive(node: &BvhNode, query: &Aabb, tolerance: f64, result: &mut Vec<usize>) {
        match node {
            BvhNode::Leaf { bbox, items } => {
                if bbox.intersects(query, tolerance) {
                    result.extend(
                        items
                            .iter()
                            .filter(|(_, item_box)| item_box.intersects(query, tolerance))
                            .map(|&(item, _)| item),
                    );
                }
            }
            BvhNode::Internal { bbox, left, right } => {
                if bbox.intersects(query, tolerance) {
                    Self::query_recursive(left, query, tolerance, result);
                    Self::query_recursive(right, query, tolerance, result);
                }
            }
        }
    }
}
