//! Mesh-versus-mesh collision.
//!
//! A [`CrossMeshIntersector`] indexes a reference mesh once (for example a
//! mannequin) and then probes any number of other meshes (garments) against
//! it. Only surfaces are compared: a probe lying entirely inside the
//! reference without touching its surface does not intersect.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::bvh::Bvh;
use crate::intersect::{IntersectionParams, triangles_intersect};
use crate::tracing_ext::OperationTimer;
use crate::types::{Triangle, TriangleSoup};

/// Outcome of probing one mesh against a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IntersectionResult {
    /// True if any probe face touches the reference surface.
    pub intersects: bool,
    /// Probe-mesh face indices that hit the reference, ascending.
    pub faces: Vec<u32>,
    /// Probe faces with finite coordinates that were tested.
    pub probe_faces_checked: usize,
    /// Face pairs that survived the bounding-box broad phase.
    pub candidate_pairs: usize,
}

impl std::fmt::Display for IntersectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.intersects {
            write!(
                f,
                "Intersects: {} of {} probe face(s) collide",
                self.faces.len(),
                self.probe_faces_checked
            )
        } else {
            write!(f, "No intersection ({} probe faces)", self.probe_faces_checked)
        }
    }
}

/// Reusable index over a reference mesh.
pub struct CrossMeshIntersector {
    triangles: Vec<Triangle>,
    bvh: Bvh,
    params: IntersectionParams,
}

impl CrossMeshIntersector {
    /// Index the reference mesh. Faces with non-finite coordinates are left out.
    pub fn new(reference: &TriangleSoup, params: IntersectionParams) -> Self {
        let _timer = OperationTimer::with_faces("reference_index", reference.face_count());
        let triangles: Vec<Triangle> = reference.triangles().collect();
        let bvh = Bvh::build(
            triangles.iter().map(Triangle::aabb).enumerate(),
            params.max_leaf_size,
        );
        debug!(indexed = bvh.len(), "Indexed reference mesh");
        Self {
            triangles,
            bvh,
            params,
        }
    }

    /// Number of reference faces in the index.
    pub fn reference_face_count(&self) -> usize {
        self.bvh.len()
    }

    /// Test every face of `probe` against the reference.
    pub fn probe(&self, probe: &TriangleSoup) -> IntersectionResult {
        let _timer = OperationTimer::with_faces("cross_mesh", probe.face_count());
        let epsilon = self.params.epsilon;
        let candidates = AtomicUsize::new(0);
        let checked = AtomicUsize::new(0);

        let faces: Vec<u32> = (0..probe.face_count())
            .into_par_iter()
            .filter_map(|face| {
                let tri = probe.triangle(face)?;
                if !tri.is_finite() {
                    return None;
                }
                checked.fetch_add(1, Ordering::Relaxed);

                let hits = self.bvh.query(&tri.aabb(), epsilon);
                candidates.fetch_add(hits.len(), Ordering::Relaxed);
                hits.iter()
                    .any(|&r| triangles_intersect(&tri, &self.triangles[r], epsilon))
                    .then_some(face as u32)
            })
            .collect();

        let result = IntersectionResult {
            intersects: !faces.is_empty(),
            faces,
            probe_faces_checked: checked.load(Ordering::Relaxed),
            candidate_pairs: candidates.load(Ordering::Relaxed),
        };

        info!(
            intersects = result.intersects,
            colliding_faces = result.faces.len(),
            "Cross-mesh check complete"
        );
        result
    }
}

/// One-shot check of `probe` against `reference`.
///
/// `intersects` is symmetric in the two meshes; `faces` indexes `probe`.
pub fn intersect_meshes(
    reference: &TriangleSoup,
    probe: &TriangleSoup,
    params: &IntersectionParams,
) -> IntersectionResult {
    CrossMeshIntersector::new(reference, params.clone()).probe(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{cube, tetrahedron};
    use nalgebra::{Point3, Vector3};

    fn translated(soup: &TriangleSoup, offset: Vector3<f64>) -> TriangleSoup {
        let mut out = TriangleSoup::new();
        for tri in soup.triangles() {
            out.push_triangle([tri.v0 + offset, tri.v1 + offset, tri.v2 + offset]);
        }
        out
    }

    #[test]
    fn test_disjoint_meshes() {
        let a = cube();
        let b = translated(&cube(), Vector3::new(3.0, 0.0, 0.0));
        let result = intersect_meshes(&a, &b, &IntersectionParams::default());
        assert!(!result.intersects);
        assert!(result.faces.is_empty());
        assert_eq!(result.probe_faces_checked, 12);
        assert_eq!(result.candidate_pairs, 0);
    }

    #[test]
    fn test_overlapping_meshes_both_directions() {
        let a = cube();
        let b = translated(&cube(), Vector3::new(0.5, 0.5, 0.5));
        let params = IntersectionParams::default();

        let ab = intersect_meshes(&a, &b, &params);
        let ba = intersect_meshes(&b, &a, &params);
        assert!(ab.intersects);
        assert_eq!(ab.intersects, ba.intersects);
        assert!(ab.faces.iter().all(|&f| f < 12));
        assert!(ab.faces.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_contained_mesh_does_not_touch_surface() {
        let big = {
            let mut s = TriangleSoup::new();
            for tri in cube().triangles() {
                s.push_triangle([
                    Point3::from(tri.v0.coords * 10.0),
                    Point3::from(tri.v1.coords * 10.0),
                    Point3::from(tri.v2.coords * 10.0),
                ]);
            }
            s
        };
        let inner = translated(&tetrahedron(), Vector3::new(4.0, 4.0, 4.0));
        let result = intersect_meshes(&big, &inner, &IntersectionParams::default());
        assert!(!result.intersects);
    }

    #[test]
    fn test_reused_index_for_many_probes() {
        let intersector = CrossMeshIntersector::new(&cube(), IntersectionParams::default());
        assert_eq!(intersector.reference_face_count(), 12);

        let near = translated(&tetrahedron(), Vector3::new(0.5, 0.5, 0.5));
        let far = translated(&tetrahedron(), Vector3::new(9.0, 9.0, 9.0));
        assert!(intersector.probe(&near).intersects);
        assert!(!intersector.probe(&far).intersects);
    }

    #[test]
    fn test_non_finite_probe_faces_skipped() {
        let mut probe = translated(&tetrahedron(), Vector3::new(0.5, 0.5, 0.5));
        probe.positions[0].x = f64::NAN;
        let result = intersect_meshes(&cube(), &probe, &IntersectionParams::default());
        assert_eq!(result.probe_faces_checked, 3);
        assert!(!result.faces.contains(&0));
    }

    #[test]
    fn test_empty_inputs() {
        let params = IntersectionParams::default();
        let result = intersect_meshes(&TriangleSoup::new(), &cube(), &params);
        assert!(!result.intersects);
        assert_eq!(result.probe_faces_checked, 12);

        let result = intersect_meshes(&cube(), &TriangleSoup::new(), &params);
        assert!(!result.intersects);
        assert_eq!(result.probe_faces_checked, 0);
    }
}
