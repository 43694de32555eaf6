//! Defect analysis for triangle meshes.
//!
//! This crate inspects triangle soups, as produced by an OBJ loader, for the
//! defects that break downstream tools: open boundaries, non-manifold
//! vertices, self-intersections, holes, degenerate faces, overlapping or
//! out-of-range texture coordinates, and collisions between two meshes (for
//! example a garment and the mannequin it is fitted to).
//!
//! # Features
//!
//! - **Topology**: Weld coincident corners, drop collapsed and duplicate faces,
//!   orient shells consistently, and build a half-edge structure
//! - **Manifold checks**: Watertightness, non-manifold vertices, hole loops,
//!   degenerate faces
//! - **Self-intersection**: BVH broad phase with a separating-axis narrow phase
//! - **UV layout**: Island detection, rasterized overlap test, bounds count
//! - **Collision**: Index a reference mesh once and probe many meshes against it
//! - **Batch**: Check many meshes on a worker pool with a serialized result sink
//!
//! # Face Indices
//!
//! Every face index reported in a result refers to the input soup, even when
//! welding has dropped or reordered faces internally.
//!
//! # Quick Start
//!
//! ```
//! use mesh_check::{CheckParams, CheckSet, TriangleSoup, check};
//! use nalgebra::Point3;
//!
//! let vertices = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let soup = TriangleSoup::from_indexed(
//!     &vertices,
//!     &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
//! );
//!
//! let result = check(&soup, &CheckSet::all(), &CheckParams::default());
//! assert!(result.is_watertight);
//! assert_eq!(result.hole_count, 0);
//! println!("{}", result);
//! ```
//!
//! # Selecting Checks
//!
//! ```
//! use mesh_check::{CheckKind, CheckParams, CheckSet, TriangleSoup, check};
//!
//! let checks: CheckSet = "holes,degenerate".parse().unwrap();
//! assert!(checks.contains(CheckKind::Holes));
//!
//! let result = check(&TriangleSoup::new(), &checks, &CheckParams::default());
//! // An empty soup cannot be analyzed; every requested check says why.
//! assert_eq!(result.failed_checks().len(), 2);
//! ```
//!
//! # Mesh-vs-Mesh Collision
//!
//! ```
//! use mesh_check::{CrossMeshIntersector, IntersectionParams, TriangleSoup};
//! use nalgebra::Point3;
//!
//! let mut mannequin = TriangleSoup::new();
//! mannequin.push_triangle([
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(2.0, 0.0, 0.0),
//!     Point3::new(0.0, 2.0, 0.0),
//! ]);
//! let mut shirt = TriangleSoup::new();
//! shirt.push_triangle([
//!     Point3::new(0.5, 0.5, -1.0),
//!     Point3::new(0.5, 0.5, 1.0),
//!     Point3::new(1.0, 0.2, 0.0),
//! ]);
//!
//! let index = CrossMeshIntersector::new(&mannequin, IntersectionParams::default());
//! let result = index.probe(&shirt);
//! assert!(result.intersects);
//! assert_eq!(result.faces, vec![0]);
//! ```

mod error;
mod types;

pub mod batch;
pub mod bvh;
pub mod check;
pub mod collision;
pub mod intersect;
pub mod manifold;
pub mod progress;
pub mod topology;
pub mod tracing_ext;
pub mod uv;

#[cfg(test)]
mod test_meshes;

// Core types
pub use error::{ErrorCode, MeshError, MeshResult};
pub use types::{Triangle, TriangleSoup};

// Orchestration
pub use check::{
    AnalysisStatus, CheckKind, CheckParams, CheckResult, CheckSet, check, check_with_context,
};
pub use progress::{CancelFlag, CheckContext};

// Analyses
pub use bvh::{Aabb, Bvh};
pub use collision::{CrossMeshIntersector, IntersectionResult, intersect_meshes};
pub use intersect::{
    IntersectionParams, SelfIntersectionReport, find_self_intersections, triangles_intersect,
};
pub use manifold::{
    DEFAULT_DEGENERATE_TOLERANCE, DegenerateReport, HoleLoop, HoleReport, NonManifoldReport,
    WatertightReport, check_watertight, degeneracy_ratio, find_degenerate, find_holes,
    find_non_manifold, is_degenerate_triangle,
};
pub use topology::{
    HalfEdge, RemovalReason, RemovedFace, TopoFace, Topology, TopologyBuilder, TopologyParams,
};
pub use uv::{
    MAX_GRID_RESOLUTION, UvIslands, UvOverlapReport, UvParams, count_uvs_out_of_bounds,
    find_uv_islands, find_uv_overlaps, has_uvs, point_in_uv_triangle,
};

// Batch processing
pub use batch::{
    BatchConfig, BatchEntry, BatchJob, BatchSummary, JobSource, Loader, ResultSink, Workers,
    run_batch,
};

// Logging helpers
pub use tracing_ext::{OperationTimer, log_check_result, log_soup_stats};
