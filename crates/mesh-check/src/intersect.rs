//! Self-intersection detection.
//!
//! Candidate pairs come from a BVH over the topology faces; each candidate is
//! confirmed with a separating-axis triangle test. Faces sharing a welded
//! vertex touch legitimately and are never tested.

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::bvh::{Aabb, Bvh};
use crate::error::{MeshError, MeshResult};
use crate::topology::{TopoFace, Topology};
use crate::tracing_ext::OperationTimer;
use crate::types::Triangle;

/// Parameters for triangle intersection queries.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IntersectionParams {
    /// Tolerance for projections and bounding-box overlap.
    ///
    /// Default: `1e-10`
    pub epsilon: f64,

    /// Maximum triangles per BVH leaf.
    ///
    /// Default: `8`
    pub max_leaf_size: usize,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-10,
            max_leaf_size: 8,
        }
    }
}

impl IntersectionParams {
    /// Validate parameter ranges.
    pub fn validate(&self) -> MeshResult<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(MeshError::invalid_params(
                "epsilon",
                format!("must be finite and >= 0, got {}", self.epsilon),
            ));
        }
        if self.max_leaf_size == 0 {
            return Err(MeshError::invalid_params("max_leaf_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Result of self-intersection detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfIntersectionReport {
    /// Intersecting pairs as `(lower, higher)` soup face indices, sorted.
    pub pairs: Vec<(u32, u32)>,
    /// Every soup face appearing in a pair, ascending.
    pub faces: Vec<u32>,
    /// Pairs that survived the bounding-box broad phase.
    pub candidate_pairs: usize,
}

impl SelfIntersectionReport {
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_clean(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl std::fmt::Display for SelfIntersectionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pairs.is_empty() {
            write!(f, "No self-intersections detected")
        } else {
            write!(
                f,
                "Self-intersections found: {} pair(s) across {} face(s)",
                self.pairs.len(),
                self.faces.len()
            )
        }
    }
}

fn face_triangle(topology: &Topology, face: &TopoFace) -> Triangle {
    let [a, b, c] = face.vertices.map(|v| topology.vertex_position(v));
    Triangle::new(a, b, c)
}

#[inline]
fn shares_vertex(a: &TopoFace, b: &TopoFace) -> bool {
    a.vertices.iter().any(|v| b.vertices.contains(v))
}

/// Find intersecting pairs of non-adjacent faces.
pub fn find_self_intersections(
    topology: &Topology,
    params: &IntersectionParams,
) -> SelfIntersectionReport {
    let faces = topology.faces();
    if faces.len() < 2 {
        return SelfIntersectionReport::default();
    }

    let _timer = OperationTimer::with_faces("self_intersection", faces.len());

    let triangles: Vec<Triangle> = faces.iter().map(|f| face_triangle(topology, f)).collect();
    let boxes: Vec<Aabb> = triangles.iter().map(Triangle::aabb).collect();
    let bvh = Bvh::build(boxes.iter().copied().enumerate(), params.max_leaf_size);

    let candidates = AtomicUsize::new(0);
    let mut pairs: Vec<(u32, u32)> = (0..faces.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let mut local = Vec::new();
            for j in bvh.query(&boxes[i], params.epsilon) {
                if j <= i || shares_vertex(&faces[i], &faces[j]) {
                    continue;
                }
                candidates.fetch_add(1, Ordering::Relaxed);

                if triangles_intersect(&triangles[i], &triangles[j], params.epsilon) {
                    let (a, b) = (faces[i].source, faces[j].source);
                    local.push((a.min(b), a.max(b)));
                }
            }
            local
        })
        .collect();
    pairs.sort_unstable();

    let mut implicated: Vec<u32> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
    implicated.sort_unstable();
    implicated.dedup();

    let candidate_pairs = candidates.load(Ordering::Relaxed);
    debug!(candidate_pairs, "Broad phase complete");

    if pairs.is_empty() {
        info!("No self-intersections found");
    } else {
        warn!(
            pairs = pairs.len(),
            faces = implicated.len(),
            "Found self-intersecting triangle pairs"
        );
    }

    SelfIntersectionReport {
        pairs,
        faces: implicated,
        candidate_pairs,
    }
}

/// Test if two triangles intersect.
///
/// Separating axis test over the two normals and the nine edge-edge cross
/// products; coplanar triangles use the in-plane edge normals instead.
/// Triangles closer than `epsilon` along every axis count as touching, and
/// touching counts as intersecting. Degenerate triangles never intersect.
pub fn triangles_intersect(t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let n1 = t1.normal_unnormalized();
    let n2 = t2.normal_unnormalized();

    if n1.norm_squared() < epsilon * epsilon || n2.norm_squared() < epsilon * epsilon {
        return false;
    }

    let edges1 = [t1.v1 - t1.v0, t1.v2 - t1.v1, t1.v0 - t1.v2];
    let edges2 = [t2.v1 - t2.v0, t2.v2 - t2.v1, t2.v0 - t2.v2];

    let cross_normals = n1.cross(&n2);
    let is_coplanar =
        cross_normals.norm_squared() < epsilon * epsilon * n1.norm_squared() * n2.norm_squared();

    if is_coplanar {
        // Coplanar but on parallel planes apart from each other
        if separated_by_axis(&n1, t1, t2, epsilon) {
            return false;
        }

        for edge in &edges1 {
            let axis = n1.cross(edge);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
        for edge in &edges2 {
            let axis = n2.cross(edge);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
        return true;
    }

    if separated_by_axis(&n1, t1, t2, epsilon) || separated_by_axis(&n2, t1, t2, epsilon) {
        return false;
    }

    for e1 in &edges1 {
        for e2 in &edges2 {
            let axis = e1.cross(e2);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
    }

    true
}

/// Check if two triangles are separated along `axis`.
fn separated_by_axis(axis: &Vector3<f64>, t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let p1 = [
        axis.dot(&t1.v0.coords),
        axis.dot(&t1.v1.coords),
        axis.dot(&t1.v2.coords),
    ];
    let min1 = p1[0].min(p1[1]).min(p1[2]);
    let max1 = p1[0].max(p1[1]).max(p1[2]);

    let p2 = [
        axis.dot(&t2.v0.coords),
        axis.dot(&t2.v1.coords),
        axis.dot(&t2.v2.coords),
    ];
    let min2 = p2[0].min(p2[1]).min(p2[2]);
    let max2 = p2[0].max(p2[1]).max(p2[2]);

    max1 + epsilon < min2 || max2 + epsilon < min1
}
