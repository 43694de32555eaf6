//! Tracing helpers for mesh checks.
//!
//! Enable output by installing a subscriber in the application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_check=debug for per-analysis detail,
//! // RUST_LOG=mesh_check::timing=info for timings only.
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: Degraded or failed analyses, dropped input
//! - **INFO**: Per-mesh summaries, timing
//! - **DEBUG**: Intermediate counts (welded vertices, candidate pairs)
//! - **TRACE**: Per-face detail

use std::time::Instant;
use tracing::{Span, debug, info, warn};

use crate::check::CheckResult;
use crate::types::TriangleSoup;

/// A performance timer that logs its duration on drop.
///
/// ```rust,ignore
/// use mesh_check::tracing_ext::OperationTimer;
///
/// fn build() {
///     let _timer = OperationTimer::new("topology");
///     // ... work ...
/// } // logs `elapsed_ms` here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!("mesh_operation", operation = name);
        debug!(target: "mesh_check::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the face count it works on.
    pub fn with_faces(name: &'static str, face_count: usize) -> Self {
        let span = tracing::debug_span!("mesh_operation", operation = name, faces = face_count);
        debug!(
            target: "mesh_check::timing",
            operation = name,
            faces = face_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "mesh_check::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log soup dimensions at debug level.
pub fn log_soup_stats(soup: &TriangleSoup, context: &str) {
    let (min, max) = soup.bounds().unwrap_or_default();
    let dims = max - min;

    debug!(
        target: "mesh_check::mesh_state",
        context = context,
        faces = soup.face_count(),
        corners = soup.corner_count(),
        has_uvs = soup.has_uvs(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Soup state"
    );
}

/// Log the headline of a check result.
pub fn log_check_result(result: &CheckResult) {
    if result.is_clean() {
        info!(
            target: "mesh_check::result",
            watertight = result.is_watertight,
            faces = result.face_count,
            "Mesh passed all requested checks"
        );
    } else {
        warn!(
            target: "mesh_check::result",
            watertight = result.is_watertight,
            non_manifold_vertices = result.non_manifold_vertex_count,
            self_intersections = result.self_intersection_count,
            holes = result.hole_count,
            degenerate_faces = result.degenerate_face_count,
            uv_overlaps = result.overlapping_uv_count,
            uv_out_of_bounds = result.uv_out_of_bounds_count,
            failed = result.failed_checks().len(),
            "Mesh has defects"
        );
    }
}
