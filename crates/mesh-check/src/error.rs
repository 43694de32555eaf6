//! Error types for mesh checks with diagnostic codes.
//!
//! Each error has a code in the format `CHECK-XXXX`:
//! - `CHECK-2xxx`: Input errors (empty or malformed soups)
//! - `CHECK-3xxx`: Analysis errors (numerical failures, panics inside an analyzer)
//! - `CHECK-4xxx`: Resource and configuration errors
//! - `CHECK-5xxx`: Batch errors (worker pool, result sink, loading)
//!
//! Analyses never surface these errors to the caller of
//! [`check`](crate::check::check) directly. The orchestrator converts them into
//! an [`AnalysisStatus`](crate::check::AnalysisStatus) so that one failed
//! analysis cannot take down its siblings.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for mesh check operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// CHECK-2001: Soup has no faces
    EmptyMesh = 2001,
    /// CHECK-2002: Corner count is not a multiple of three
    RaggedSoup = 2002,
    /// CHECK-2003: Corner has a NaN or infinite coordinate
    InvalidCoordinate = 2003,

    /// CHECK-3001: Geometric computation produced a non-finite value
    NumericalFailure = 3001,
    /// CHECK-3002: Analyzer panicked and was isolated
    AnalysisPanicked = 3002,

    /// CHECK-4001: Mesh exceeds the configured face ceiling
    TooLarge = 4001,
    /// CHECK-4002: Parameters out of range
    InvalidParams = 4002,
    /// CHECK-4003: Operation cancelled before it started
    Cancelled = 4003,

    /// CHECK-5001: Worker pool could not be created
    WorkerPool = 5001,
    /// CHECK-5002: Result sink rejected an entry
    SinkFailed = 5002,
    /// CHECK-5003: Batch job could not produce its mesh
    LoadFailed = 5003,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `CHECK-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyMesh => "CHECK-2001",
            ErrorCode::RaggedSoup => "CHECK-2002",
            ErrorCode::InvalidCoordinate => "CHECK-2003",
            ErrorCode::NumericalFailure => "CHECK-3001",
            ErrorCode::AnalysisPanicked => "CHECK-3002",
            ErrorCode::TooLarge => "CHECK-4001",
            ErrorCode::InvalidParams => "CHECK-4002",
            ErrorCode::Cancelled => "CHECK-4003",
            ErrorCode::WorkerPool => "CHECK-5001",
            ErrorCode::SinkFailed => "CHECK-5002",
            ErrorCode::LoadFailed => "CHECK-5003",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while checking meshes.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum MeshError {
    /// The soup contains no complete triangle.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh_check::empty_mesh),
        help("The loader produced no faces. Check that the file contains triangles.")
    )]
    EmptyMesh { details: String },

    /// Corner count is not a multiple of three.
    #[error("triangle soup has {corner_count} corners, which is not a multiple of 3")]
    #[diagnostic(
        code(mesh_check::ragged_soup),
        help("Trailing corners are ignored. The loader should emit one corner triple per face.")
    )]
    RaggedSoup { corner_count: usize },

    /// A corner position is NaN or infinite.
    #[error("invalid coordinate at corner {corner_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(mesh_check::invalid_coordinate),
        help("Faces touching this corner are excluded from topology-based checks.")
    )]
    InvalidCoordinate {
        corner_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// A geometric predicate or accumulation produced a non-finite value.
    #[error("numerical failure in {analysis}: {details}")]
    #[diagnostic(code(mesh_check::numerical_failure))]
    NumericalFailure {
        analysis: &'static str,
        details: String,
    },

    /// An analyzer panicked; the panic was caught and isolated.
    #[error("{analysis} analysis panicked: {message}")]
    #[diagnostic(
        code(mesh_check::analysis_panicked),
        help("Other analyses of the same mesh are unaffected.")
    )]
    AnalysisPanicked {
        analysis: &'static str,
        message: String,
    },

    /// The mesh is larger than the configured ceiling.
    #[error("mesh has {faces} faces, exceeding the limit of {limit}")]
    #[diagnostic(
        code(mesh_check::too_large),
        help("Raise `CheckParams::max_faces` or decimate the mesh first.")
    )]
    TooLarge { faces: usize, limit: usize },

    /// Parameters are out of their valid range.
    #[error("invalid parameter {name}: {details}")]
    #[diagnostic(code(mesh_check::invalid_params))]
    InvalidParams { name: &'static str, details: String },

    /// The operation was cancelled before it started.
    #[error("operation cancelled")]
    #[diagnostic(code(mesh_check::cancelled))]
    Cancelled,

    /// The worker pool for batch processing could not be built.
    #[error("failed to create worker pool: {details}")]
    #[diagnostic(code(mesh_check::worker_pool))]
    WorkerPool { details: String },

    /// The result sink refused an entry.
    #[error("result sink failed: {details}")]
    #[diagnostic(code(mesh_check::sink_failed))]
    SinkFailed { details: String },

    /// A batch job could not produce its mesh.
    #[error("failed to load {id}: {details}")]
    #[diagnostic(code(mesh_check::load_failed))]
    LoadFailed { id: String, details: String },
}

impl MeshError {
    /// Get the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::RaggedSoup { .. } => ErrorCode::RaggedSoup,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::NumericalFailure { .. } => ErrorCode::NumericalFailure,
            MeshError::AnalysisPanicked { .. } => ErrorCode::AnalysisPanicked,
            MeshError::TooLarge { .. } => ErrorCode::TooLarge,
            MeshError::InvalidParams { .. } => ErrorCode::InvalidParams,
            MeshError::Cancelled => ErrorCode::Cancelled,
            MeshError::WorkerPool { .. } => ErrorCode::WorkerPool,
            MeshError::SinkFailed { .. } => ErrorCode::SinkFailed,
            MeshError::LoadFailed { .. } => ErrorCode::LoadFailed,
        }
    }

    // Constructor helpers

    /// Create a numerical failure error.
    pub fn numerical(analysis: &'static str, details: impl Into<String>) -> Self {
        MeshError::NumericalFailure {
            analysis,
            details: details.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_params(name: &'static str, details: impl Into<String>) -> Self {
        MeshError::InvalidParams {
            name,
            details: details.into(),
        }
    }

    /// Create a load failure error for a batch job.
    pub fn load_failed(id: impl Into<String>, details: impl Into<String>) -> Self {
        MeshError::LoadFailed {
            id: id.into(),
            details: details.into(),
        }
    }

    /// Create a sink failure error.
    pub fn sink_failed(details: impl Into<String>) -> Self {
        MeshError::SinkFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::EmptyMesh.as_str(), "CHECK-2001");
        assert_eq!(ErrorCode::TooLarge.as_str(), "CHECK-4001");
        assert_eq!(ErrorCode::LoadFailed.to_string(), "CHECK-5003");
    }

    #[test]
    fn test_error_code_mapping() {
        let err = MeshError::TooLarge {
            faces: 10,
            limit: 5,
        };
        assert_eq!(err.code(), ErrorCode::TooLarge);
        assert!(err.to_string().contains("10 faces"));

        let err = MeshError::numerical("degenerate", "area is NaN");
        assert_eq!(err.code(), ErrorCode::NumericalFailure);
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn test_invalid_coordinate_display() {
        let err = MeshError::InvalidCoordinate {
            corner_index: 7,
            coordinate: "z",
            value: f64::INFINITY,
        };
        let output = err.to_string();
        assert!(output.contains("corner 7"));
        assert!(output.contains("z"));
        assert!(output.contains("inf"));
    }
}
