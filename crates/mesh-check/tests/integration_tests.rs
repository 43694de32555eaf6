//! End-to-end tests for mesh-check.
//!
//! These run whole checks on small hand-built meshes and compare the
//! aggregate result with what the mesh is known to contain.

use mesh_check::{
    AnalysisStatus, BatchConfig, BatchEntry, BatchJob, CancelFlag, CheckKind, CheckParams,
    CheckSet, IntersectionParams, TopologyBuilder, TriangleSoup, check, degeneracy_ratio,
    find_self_intersections, intersect_meshes, run_batch, triangles_intersect,
};
use nalgebra::{Point2, Point3, Vector3};

/// Axis-aligned cube with outward CCW winding.
fn create_cube(size: f64) -> TriangleSoup {
    let v = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(size, 0.0, 0.0),
        Point3::new(size, size, 0.0),
        Point3::new(0.0, size, 0.0),
        Point3::new(0.0, 0.0, size),
        Point3::new(size, 0.0, size),
        Point3::new(size, size, size),
        Point3::new(0.0, size, size),
    ];
    let faces = [
        [0, 2, 1],
        [0, 3, 2], // bottom
        [4, 5, 6],
        [4, 6, 7], // top
        [0, 1, 5],
        [0, 5, 4], // front
        [3, 7, 6],
        [3, 6, 2], // back
        [0, 4, 7],
        [0, 7, 3], // left
        [1, 2, 6],
        [1, 6, 5], // right
    ];
    TriangleSoup::from_indexed(&v, &faces)
}

/// Copy of `soup` with the listed faces left out.
fn without_faces(soup: &TriangleSoup, skip: &[usize]) -> TriangleSoup {
    let mut out = TriangleSoup::new();
    for (f, tri) in soup.triangles().enumerate() {
        if !skip.contains(&f) {
            out.push_triangle([tri.v0, tri.v1, tri.v2]);
        }
    }
    out
}

fn translated(soup: &TriangleSoup, offset: Vector3<f64>) -> TriangleSoup {
    let mut out = soup.clone();
    for p in &mut out.positions {
        *p += offset;
    }
    out
}

#[test]
fn test_closed_cube_is_clean() {
    let result = check(&create_cube(1.0), &CheckSet::all(), &CheckParams::default());

    assert!(result.is_watertight);
    assert_eq!(result.non_manifold_vertex_count, 0);
    assert_eq!(result.self_intersection_count, 0);
    assert_eq!(result.hole_count, 0);
    assert_eq!(result.degenerate_face_count, 0);
    assert!(result.is_clean());
}

#[test]
fn test_cube_with_one_side_removed() {
    // Top side is faces 2 and 3
    let soup = without_faces(&create_cube(1.0), &[2, 3]);
    let result = check(&soup, &CheckSet::all(), &CheckParams::default());

    assert!(!result.is_watertight);
    assert_eq!(result.hole_count, 1);
    assert_eq!(result.hole_loops[0].len(), 4);
    assert!(result.hole_loops[0].closed);
    assert_eq!(result.truncated_hole_count, 0);
}

#[test]
fn test_single_triangle_removed_leaves_triangular_hole() {
    let soup = without_faces(&create_cube(2.0), &[7]);
    let result = check(&soup, &CheckSet::all(), &CheckParams::default());

    assert!(!result.is_watertight);
    assert_eq!(result.hole_count, 1);
    assert_eq!(result.hole_loops[0].len(), 3);
}

#[test]
fn test_hole_loops_from_disjoint_removals() {
    // One triangle from the bottom, one from the top
    let soup = without_faces(&create_cube(1.0), &[0, 2]);
    let result = check(&soup, &CheckSet::all(), &CheckParams::default());
    assert_eq!(result.hole_count, 2);
    assert!(result.hole_loops.iter().all(|l| l.len() == 3));
}

#[test]
fn test_degenerate_threshold_boundary() {
    let p0 = Point3::new(0.0, 0.0, 0.0);
    let p1 = Point3::new(1.0, 0.0, 0.0);
    let p2 = Point3::new(0.5, 1e-5, 0.0);
    let ratio = degeneracy_ratio(&p0, &p1, &p2);
    assert!(ratio > 0.0);

    let mut soup = TriangleSoup::new();
    soup.push_triangle([p0, p1, p2]);

    let checks = CheckSet::empty().with(CheckKind::DegenerateFaces);
    let at = CheckParams {
        degenerate_tolerance: ratio,
        ..Default::default()
    };
    let above = CheckParams {
        degenerate_tolerance: ratio * (1.0 + 1e-9),
        ..Default::default()
    };

    // Strictly below the tolerance is degenerate; equal is not.
    assert_eq!(check(&soup, &checks, &at).degenerate_face_count, 0);
    assert_eq!(check(&soup, &checks, &above).degenerate_faces, vec![0]);
}

#[test]
fn test_repeated_vertex_face_is_degenerate() {
    let mut soup = create_cube(1.0);
    let p = Point3::new(3.0, 3.0, 3.0);
    soup.push_triangle([p, p, Point3::new(4.0, 3.0, 3.0)]);

    let result = check(&soup, &CheckSet::all(), &CheckParams::default());
    assert!(result.degenerate_faces.contains(&12));
    assert_eq!(result.removed_face_count, 1);
    // The rest of the cube is still closed
    assert!(result.is_watertight);
}

#[test]
fn test_self_intersection_is_symmetric() {
    let mut soup = create_cube(1.0);
    // A sheet piercing the cube through two opposite sides
    soup.push_triangle([
        Point3::new(-1.0, 0.5, 0.2),
        Point3::new(2.0, 0.5, 0.2),
        Point3::new(0.5, 0.5, 0.9),
    ]);

    let topology = TopologyBuilder::default().build(&soup);
    let report = find_self_intersections(&topology, &IntersectionParams::default());
    assert!(report.pair_count() > 0);

    let triangles: Vec<_> = soup.triangles().collect();
    for &(i, j) in &report.pairs {
        assert!(i < j);
        assert!(report.faces.contains(&i));
        assert!(report.faces.contains(&j));
        let (a, b) = (&triangles[i as usize], &triangles[j as usize]);
        assert_eq!(
            triangles_intersect(a, b, 1e-10),
            triangles_intersect(b, a, 1e-10)
        );
    }
    assert!(report.faces.contains(&12));

    let result = check(&soup, &CheckSet::all(), &CheckParams::default());
    assert_eq!(result.self_intersection_count, report.pair_count());
    assert_eq!(result.intersecting_faces, report.faces);
}

#[test]
fn test_duplicate_uv_triangles_overlap() {
    let mut soup = TriangleSoup::new();
    let uvs = [
        Point2::new(0.1, 0.1),
        Point2::new(0.6, 0.1),
        Point2::new(0.1, 0.6),
    ];
    // Two triangles sharing only vertex (0, 0, 0)
    soup.push_triangle_with_uvs(
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ],
        uvs,
    );
    soup.push_triangle_with_uvs(
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
        ],
        uvs,
    );

    let result = check(&soup, &CheckSet::all(), &CheckParams::default());
    assert!(result.has_uvs);
    assert!(result.overlapping_uv_count >= 2);
    assert!(result.overlapping_uv_faces.contains(&0));
    assert!(result.overlapping_uv_faces.contains(&1));
    assert_eq!(result.uv_out_of_bounds_count, 0);
}

#[test]
fn test_uv_bounds_count_ignores_grouping() {
    let corners = [
        Point2::new(-0.5, 0.5),
        Point2::new(0.5, 0.5),
        Point2::new(0.5, 1.5),
        Point2::new(0.2, 0.2),
        Point2::new(2.0, -1.0),
        Point2::new(0.8, 0.1),
    ];
    let expected = 3;

    let mut soup = without_faces(&create_cube(1.0), &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    soup.uvs = corners.to_vec();
    let first = check(&soup, &CheckSet::all(), &CheckParams::default());

    // Same coordinates assigned to the other face
    soup.uvs = corners[3..].iter().chain(&corners[..3]).copied().collect();
    let second = check(&soup, &CheckSet::all(), &CheckParams::default());

    assert_eq!(first.uv_out_of_bounds_count, expected);
    assert_eq!(second.uv_out_of_bounds_count, expected);
}

#[test]
fn test_disjoint_meshes_do_not_intersect() {
    let mannequin = create_cube(1.0);
    let apparel = translated(&create_cube(1.0), Vector3::new(5.0, 0.0, 0.0));

    let result = intersect_meshes(&mannequin, &apparel, &IntersectionParams::default());
    assert!(!result.intersects);
    assert!(result.faces.is_empty());
}

#[test]
fn test_cross_mesh_direction_is_consistent() {
    let a = create_cube(1.0);
    let b = translated(&create_cube(0.5), Vector3::new(0.75, 0.25, 0.25));
    let params = IntersectionParams::default();

    let ab = intersect_meshes(&a, &b, &params);
    let ba = intersect_meshes(&b, &a, &params);
    assert!(ab.intersects);
    assert_eq!(ab.intersects, ba.intersects);
    assert!(ab.faces.iter().all(|&f| (f as usize) < b.face_count()));
    assert!(ba.faces.iter().all(|&f| (f as usize) < a.face_count()));
}

#[test]
fn test_result_statuses_distinguish_failure_from_clean() {
    let empty = check(&TriangleSoup::new(), &CheckSet::all(), &CheckParams::default());
    assert_eq!(empty.defect_count(), 0);
    assert!(!empty.is_clean());
    assert!(matches!(
        empty.status(CheckKind::NonManifold),
        Some(AnalysisStatus::Failed { .. })
    ));

    let clean = check(&create_cube(1.0), &CheckSet::all(), &CheckParams::default());
    assert!(clean.statuses.values().all(AnalysisStatus::is_completed));
}

#[test]
fn test_batch_associates_results_with_jobs() {
    let jobs: Vec<BatchJob> = (0..6)
        .map(|i| {
            let soup = if i % 2 == 0 {
                create_cube(1.0 + i as f64)
            } else {
                without_faces(&create_cube(1.0), &[i])
            };
            BatchJob::from_soup(format!("mesh_{}", i), soup)
        })
        .collect();

    let mut entries: Vec<BatchEntry> = Vec::new();
    let summary = run_batch(jobs, &BatchConfig::default(), &mut entries, &CancelFlag::new())
        .expect("batch should run");

    assert_eq!(summary.submitted, 6);
    assert_eq!(summary.completed, 6);
    assert_eq!(entries.len(), 6);
    for entry in &entries {
        assert_eq!(entry.id, format!("mesh_{}", entry.index));
        let result = entry.outcome.as_ref().expect("job should succeed");
        assert_eq!(result.is_watertight, entry.index % 2 == 0);
    }
}

#[test]
fn test_welding_recovers_shared_edges_from_soup() {
    // Each face carries its own copy of every corner
    let soup = create_cube(10.0);
    assert_eq!(soup.corner_count(), 36);

    let topology = TopologyBuilder::default().build(&soup);
    assert_eq!(topology.vertex_count(), 8);
    assert_eq!(topology.face_count(), 12);
    assert_eq!(topology.boundary_edge_count(), 0);
}
