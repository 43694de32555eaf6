//! Subcommand implementations.

pub mod batch;
pub mod intersect;
pub mod single;

use anyhow::Result;
use clap::Args;
use mesh_check::{CheckParams, CheckSet, UvParams};

/// Options shared by `single` and `batch`.
#[derive(Args, Clone)]
pub struct CheckArgs {
    /// Comma-separated checks to run, or "all"
    /// (watertight, non-manifold, self-intersect, holes, degenerate, uv-overlap, uv-bounds)
    #[arg(long, default_value = "all")]
    pub checks: String,

    /// Raster resolution for the UV overlap test
    #[arg(long, default_value = "1024")]
    pub uv_resolution: u32,

    /// Relative shape tolerance for degenerate faces
    #[arg(long, default_value = "1e-12")]
    pub degenerate_tolerance: f64,

    /// Skip meshes with more faces than this
    #[arg(long, default_value = "4000000")]
    pub max_faces: usize,

    /// Run the analyses of one mesh one after another
    #[arg(long)]
    pub sequential: bool,
}

impl CheckArgs {
    pub fn check_set(&self) -> Result<CheckSet> {
        Ok(self.checks.parse()?)
    }

    pub fn params(&self) -> Result<CheckParams> {
        let params = CheckParams {
            degenerate_tolerance: self.degenerate_tolerance,
            uv: UvParams {
                grid_resolution: self.uv_resolution,
            },
            max_faces: self.max_faces,
            parallel: !self.sequential,
            ..Default::default()
        };
        params.validate()?;
        Ok(params)
    }
}
