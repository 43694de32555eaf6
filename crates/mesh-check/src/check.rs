//! The check orchestrator.
//!
//! [`check`] builds the topology once, runs every requested analysis as an
//! isolated task, and merges the per-analysis reports into one
//! [`CheckResult`]. A failing or panicking analysis only affects its own
//! fields; its [`AnalysisStatus`] records what happened.
//!
//! # Example
//!
//! ```
//! use mesh_check::{check, CheckParams, CheckSet, TriangleSoup};
//! use nalgebra::Point3;
//!
//! let mut soup = TriangleSoup::new();
//! soup.push_triangle([
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ]);
//!
//! let result = check(&soup, &CheckSet::all(), &CheckParams::default());
//! assert!(!result.is_watertight);
//! assert_eq!(result.hole_count, 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::intersect::{IntersectionParams, SelfIntersectionReport, find_self_intersections};
use crate::manifold::{
    DEFAULT_DEGENERATE_TOLERANCE, DegenerateReport, HoleLoop, HoleReport, NonManifoldReport,
    WatertightReport, check_watertight, find_degenerate, find_holes, find_non_manifold,
};
use crate::progress::CheckContext;
use crate::topology::{Topology, TopologyBuilder, TopologyParams};
use crate::tracing_ext::{OperationTimer, log_check_result};
use crate::types::TriangleSoup;
use crate::uv::{UvOverlapReport, UvParams, count_uvs_out_of_bounds, find_uv_overlaps};

/// One independently selectable analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CheckKind {
    Watertight,
    NonManifold,
    SelfIntersect,
    Holes,
    DegenerateFaces,
    UvOverlap,
    UvBounds,
}

impl CheckKind {
    pub const ALL: [CheckKind; 7] = [
        CheckKind::Watertight,
        CheckKind::NonManifold,
        CheckKind::SelfIntersect,
        CheckKind::Holes,
        CheckKind::DegenerateFaces,
        CheckKind::UvOverlap,
        CheckKind::UvBounds,
    ];

    /// Short name used in logs and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Watertight => "watertight",
            CheckKind::NonManifold => "non-manifold",
            CheckKind::SelfIntersect => "self-intersect",
            CheckKind::Holes => "holes",
            CheckKind::DegenerateFaces => "degenerate",
            CheckKind::UvOverlap => "uv-overlap",
            CheckKind::UvBounds => "uv-bounds",
        }
    }

    /// Whether the analysis reads the built topology.
    pub fn needs_topology(&self) -> bool {
        match self {
            CheckKind::Watertight
            | CheckKind::NonManifold
            | CheckKind::SelfIntersect
            | CheckKind::Holes
            | CheckKind::DegenerateFaces => true,
            CheckKind::UvOverlap | CheckKind::UvBounds => false,
        }
    }

    /// Whether the analysis reads texture coordinates.
    pub fn needs_uvs(&self) -> bool {
        !self.needs_topology()
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        CheckKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| {
                MeshError::invalid_params(
                    "checks",
                    format!(
                        "unknown check '{}', expected one of: {}",
                        s,
                        CheckKind::ALL.map(|k| k.name()).join(", ")
                    ),
                )
            })
    }
}

/// Order-independent set of requested analyses; duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CheckSet(BTreeSet<CheckKind>);

impl CheckSet {
    /// Every analysis.
    pub fn all() -> Self {
        CheckKind::ALL.into_iter().collect()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add `kind`, builder style.
    pub fn with(mut self, kind: CheckKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: CheckKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: CheckKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = CheckKind> + '_ {
        self.0.iter().copied()
    }

    /// True if any requested analysis reads the topology.
    pub fn needs_topology(&self) -> bool {
        self.iter().any(|k| k.needs_topology())
    }
}

impl FromIterator<CheckKind> for CheckSet {
    fn from_iter<I: IntoIterator<Item = CheckKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<CheckKind> for CheckSet {
    fn extend<I: IntoIterator<Item = CheckKind>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromStr for CheckSet {
    type Err = MeshError;

    /// Parse a comma-separated list, or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(CheckKind::from_str)
            .collect()
    }
}

/// How one requested analysis ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum AnalysisStatus {
    Completed,
    /// The analysis could not produce a value; its fields hold defaults.
    Failed { reason: String },
    /// Skipped because the mesh exceeds the face ceiling.
    TooLarge { faces: usize, limit: usize },
    /// Skipped because cancellation was requested first.
    Cancelled,
}

impl AnalysisStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisStatus::Completed)
    }

    fn from_error(err: &MeshError) -> Self {
        match err {
            MeshError::Cancelled => AnalysisStatus::Cancelled,
            MeshError::TooLarge { faces, limit } => AnalysisStatus::TooLarge {
                faces: *faces,
                limit: *limit,
            },
            other => AnalysisStatus::Failed {
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Completed => write!(f, "completed"),
            AnalysisStatus::Failed { reason } => write!(f, "failed: {}", reason),
            AnalysisStatus::TooLarge { faces, limit } => {
                write!(f, "skipped: {} faces exceeds limit {}", faces, limit)
            }
            AnalysisStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Parameters for a mesh check.
///
/// # Example
///
/// ```
/// use mesh_check::{CheckParams, UvParams};
///
/// let params = CheckParams {
///     uv: UvParams { grid_resolution: 2048 },
///     parallel: false,
///     ..Default::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CheckParams {
    pub topology: TopologyParams,

    /// Relative shape tolerance for degenerate faces.
    ///
    /// Default: `1e-12`
    pub degenerate_tolerance: f64,

    pub intersection: IntersectionParams,

    pub uv: UvParams,

    /// Meshes with more faces than this are not analyzed.
    ///
    /// Default: `4_000_000`
    pub max_faces: usize,

    /// Run independent analyses concurrently.
    ///
    /// Default: `true`
    pub parallel: bool,
}

impl Default for CheckParams {
    fn default() -> Self {
        Self {
            topology: TopologyParams::default(),
            degenerate_tolerance: DEFAULT_DEGENERATE_TOLERANCE,
            intersection: IntersectionParams::default(),
            uv: UvParams::default(),
            max_faces: 4_000_000,
            parallel: true,
        }
    }
}

impl CheckParams {
    /// Validate all nested parameters.
    pub fn validate(&self) -> MeshResult<()> {
        self.topology.validate()?;
        self.intersection.validate()?;
        self.uv.validate()?;
        if !self.degenerate_tolerance.is_finite() || self.degenerate_tolerance < 0.0 {
            return Err(MeshError::invalid_params(
                "degenerate_tolerance",
                format!("must be finite and >= 0, got {}", self.degenerate_tolerance),
            ));
        }
        if self.max_faces == 0 {
            return Err(MeshError::invalid_params("max_faces", "must be at least 1"));
        }
        Ok(())
    }
}

/// Aggregate result of one mesh check.
///
/// Fields of analyses that were not requested, or did not complete, keep
/// their zero defaults; consult [`statuses`](Self::statuses) to tell the two
/// apart from "no defects". All face indices are soup indices.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CheckResult {
    /// Complete faces in the input soup.
    pub face_count: usize,

    pub is_watertight: bool,
    pub non_manifold_vertex_count: usize,
    pub non_manifold_edge_count: usize,
    pub self_intersection_count: usize,
    pub hole_count: usize,
    /// Hole loops whose walk was cut short on a malformed border.
    pub truncated_hole_count: usize,
    pub degenerate_face_count: usize,
    pub has_uvs: bool,
    /// Number of faces whose UVs overlap another face.
    pub overlapping_uv_count: usize,
    pub uv_island_count: usize,
    pub uv_out_of_bounds_count: usize,
    /// Soup faces excluded from the topology.
    pub removed_face_count: usize,

    pub intersecting_faces: Vec<u32>,
    pub non_manifold_faces: Vec<u32>,
    pub degenerate_faces: Vec<u32>,
    pub overlapping_uv_faces: Vec<u32>,
    pub hole_loops: Vec<HoleLoop>,

    /// Outcome of each requested analysis.
    pub statuses: BTreeMap<CheckKind, AnalysisStatus>,
}

impl CheckResult {
    /// Requested analyses that did not complete.
    pub fn failed_checks(&self) -> Vec<CheckKind> {
        self.statuses
            .iter()
            .filter(|(_, s)| !s.is_completed())
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn status(&self, kind: CheckKind) -> Option<&AnalysisStatus> {
        self.statuses.get(&kind)
    }

    /// Sum of all defect counters.
    pub fn defect_count(&self) -> usize {
        self.non_manifold_vertex_count
            + self.self_intersection_count
            + self.hole_count
            + self.degenerate_face_count
            + self.overlapping_uv_count
            + self.uv_out_of_bounds_count
    }

    /// Every requested analysis completed and found nothing.
    pub fn is_clean(&self) -> bool {
        let watertight_ok =
            !self.statuses.contains_key(&CheckKind::Watertight) || self.is_watertight;
        self.failed_checks().is_empty() && self.defect_count() == 0 && watertight_ok
    }

    /// Positions of every hole loop, for visualization.
    pub fn hole_positions(&self) -> impl Iterator<Item = &[Point3<f64>]> {
        self.hole_loops.iter().map(|l| l.positions.as_slice())
    }

    fn apply(&mut self, output: AnalysisOutput) {
        match output {
            AnalysisOutput::Watertight(r) => self.is_watertight = r.is_watertight,
            AnalysisOutput::NonManifold(r) => {
                self.non_manifold_vertex_count = r.vertex_count();
                self.non_manifold_edge_count = r.edge_count;
                self.non_manifold_faces = r.faces;
            }
            AnalysisOutput::SelfIntersect(r) => {
                self.self_intersection_count = r.pair_count();
                self.intersecting_faces = r.faces;
            }
            AnalysisOutput::Holes(r) => {
                self.hole_count = r.hole_count();
                self.truncated_hole_count = r.truncated_count();
                self.hole_loops = r.loops;
            }
            AnalysisOutput::Degenerate(r) => {
                self.degenerate_face_count = r.count();
                self.degenerate_faces = r.faces;
            }
            AnalysisOutput::UvOverlap(r) => {
                self.overlapping_uv_count = r.count();
                self.uv_island_count = r.island_count;
                self.overlapping_uv_faces = r.faces;
            }
            AnalysisOutput::UvBounds(count) => self.uv_out_of_bounds_count = count,
        }
    }

    fn mark_all(&mut self, checks: &CheckSet, status: AnalysisStatus) {
        for kind in checks.iter() {
            self.statuses.insert(kind, status.clone());
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Watertight: {}", yes_no(self.is_watertight))?;
        writeln!(f, "Non-manifold vertices: {}", self.non_manifold_vertex_count)?;
        writeln!(f, "Self-intersections: {}", self.self_intersection_count)?;
        writeln!(f, "Holes: {}", self.hole_count)?;
        writeln!(f, "Degenerate faces: {}", self.degenerate_face_count)?;
        write!(f, "Has UVs: {}", yes_no(self.has_uvs))?;
        if self.has_uvs {
            writeln!(f)?;
            writeln!(f, "Overlapping UVs: {}", self.overlapping_uv_count)?;
            write!(f, "UVs out of bounds: {}", self.uv_out_of_bounds_count)?;
        }
        for (kind, status) in &self.statuses {
            if !status.is_completed() {
                write!(f, "\n{}: {}", kind, status)?;
            }
        }
        Ok(())
    }
}

/// Report of one analysis; each variant feeds disjoint result fields.
#[derive(Debug)]
enum AnalysisOutput {
    Watertight(WatertightReport),
    NonManifold(NonManifoldReport),
    SelfIntersect(SelfIntersectionReport),
    Holes(HoleReport),
    Degenerate(DegenerateReport),
    UvOverlap(UvOverlapReport),
    UvBounds(usize),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f`, turning a panic into [`MeshError::AnalysisPanicked`].
pub(crate) fn isolate<T>(analysis: &'static str, f: impl FnOnce() -> MeshResult<T>) -> MeshResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(MeshError::AnalysisPanicked {
            analysis,
            message: panic_message(payload.as_ref()),
        })
    })
}

fn run_analysis(
    kind: CheckKind,
    soup: &TriangleSoup,
    topology: Option<&Topology>,
    params: &CheckParams,
) -> MeshResult<AnalysisOutput> {
    let require_topology =
        || topology.ok_or_else(|| MeshError::numerical(kind.name(), "topology is unavailable"));

    let output = match kind {
        CheckKind::Watertight => AnalysisOutput::Watertight(check_watertight(require_topology()?)),
        CheckKind::NonManifold => AnalysisOutput::NonManifold(find_non_manifold(require_topology()?)),
        CheckKind::SelfIntersect => AnalysisOutput::SelfIntersect(find_self_intersections(
            require_topology()?,
            &params.intersection,
        )),
        CheckKind::Holes => AnalysisOutput::Holes(find_holes(require_topology()?)),
        CheckKind::DegenerateFaces => AnalysisOutput::Degenerate(find_degenerate(
            require_topology()?,
            params.degenerate_tolerance,
        )?),
        CheckKind::UvOverlap => AnalysisOutput::UvOverlap(find_uv_overlaps(soup, &params.uv)?),
        CheckKind::UvBounds => AnalysisOutput::UvBounds(count_uvs_out_of_bounds(soup)),
    };
    Ok(output)
}

/// Check a mesh with a default context.
pub fn check(soup: &TriangleSoup, checks: &CheckSet, params: &CheckParams) -> CheckResult {
    check_with_context(soup, checks, params, &CheckContext::default())
}

/// Check a mesh, logging under `ctx`'s span and honoring its cancel flag.
///
/// Always returns a result; see [`CheckResult::statuses`] for analyses that
/// did not complete.
pub fn check_with_context(
    soup: &TriangleSoup,
    checks: &CheckSet,
    params: &CheckParams,
    ctx: &CheckContext,
) -> CheckResult {
    ctx.in_scope(|| {
        let _timer = OperationTimer::with_faces("check", soup.face_count());
        let result = run_checks(soup, checks, params, ctx);
        log_check_result(&result);
        result
    })
}

fn run_checks(
    soup: &TriangleSoup,
    checks: &CheckSet,
    params: &CheckParams,
    ctx: &CheckContext,
) -> CheckResult {
    let mut result = CheckResult {
        face_count: soup.face_count(),
        has_uvs: soup.has_uvs(),
        ..Default::default()
    };

    if let Err(err) = params.validate() {
        warn!(error = %err, "Invalid check parameters");
        result.mark_all(checks, AnalysisStatus::from_error(&err));
        return result;
    }

    if soup.is_ragged() {
        let err = MeshError::RaggedSoup {
            corner_count: soup.corner_count(),
        };
        warn!(error = %err, "Malformed soup");
    }

    if soup.is_empty() {
        let err = MeshError::EmptyMesh {
            details: format!("{} corners, no complete triangle", soup.corner_count()),
        };
        warn!(error = %err, "Nothing to check");
        result.mark_all(checks, AnalysisStatus::from_error(&err));
        return result;
    }

    if soup.face_count() > params.max_faces {
        let err = MeshError::TooLarge {
            faces: soup.face_count(),
            limit: params.max_faces,
        };
        warn!(error = %err, "Mesh exceeds face limit");
        result.mark_all(checks, AnalysisStatus::from_error(&err));
        return result;
    }

    if ctx.is_cancelled() {
        result.mark_all(checks, AnalysisStatus::Cancelled);
        return result;
    }

    let mut tasks: Vec<CheckKind> = Vec::with_capacity(checks.len());
    for kind in checks.iter() {
        if kind.needs_uvs() && !result.has_uvs {
            // Nothing to measure without texture coordinates
            result.statuses.insert(kind, AnalysisStatus::Completed);
        } else {
            tasks.push(kind);
        }
    }

    let mut topology_error = None;
    let topology = if tasks.iter().any(|k| k.needs_topology()) {
        match isolate("topology", || {
            Ok(TopologyBuilder::new(params.topology.clone()).build(soup))
        }) {
            Ok(topology) => {
                result.removed_face_count = topology.removed_faces().len();
                if topology.is_degraded() {
                    warn!("Topology is degraded, orientation was skipped");
                }
                Some(topology)
            }
            Err(err) => {
                warn!(error = %err, "Topology build failed");
                topology_error = Some(err);
                None
            }
        }
    } else {
        None
    };

    let run = |kind: CheckKind| -> (CheckKind, MeshResult<AnalysisOutput>) {
        let outcome = ctx.in_scope(|| {
            ctx.cancel_flag().check()?;
            if kind.needs_topology()
                && let Some(err) = &topology_error
            {
                return Err(err.clone());
            }
            isolate(kind.name(), || {
                run_analysis(kind, soup, topology.as_ref(), params)
            })
        });
        (kind, outcome)
    };

    let outcomes: Vec<(CheckKind, MeshResult<AnalysisOutput>)> = if params.parallel {
        tasks.par_iter().map(|&k| run(k)).collect()
    } else {
        tasks.iter().map(|&k| run(k)).collect()
    };

    for (kind, outcome) in outcomes {
        match outcome {
            Ok(output) => {
                result.apply(output);
                result.statuses.insert(kind, AnalysisStatus::Completed);
            }
            Err(err) => {
                if !matches!(err, MeshError::Cancelled) {
                    warn!(check = kind.name(), error = %err, "Analysis did not complete");
                }
                result
                    .statuses
                    .insert(kind, AnalysisStatus::from_error(&err));
            }
        }
    }

    debug!(
        requested = checks.len(),
        completed = result.statuses.values().filter(|s| s.is_completed()).count(),
        "Checks finished"
    );
    if result.failed_checks().is_empty() {
        info!(faces = result.face_count, "All requested analyses completed");
    }

    result
}
