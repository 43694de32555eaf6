//! mesh-check intersect command - test apparel against a mannequin.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_check::{CrossMeshIntersector, IntersectionParams, IntersectionResult};
use serde::Serialize;
use tracing::warn;

use crate::{Cli, OutputFormat, loader, output};

#[derive(Serialize)]
struct ApparelReport {
    apparel: String,
    #[serde(flatten)]
    result: IntersectionResult,
}

#[derive(Serialize)]
struct IntersectReport {
    mannequin: String,
    results: Vec<ApparelReport>,
}

pub fn run(mannequin: &Path, apparel: &[PathBuf], epsilon: f64, cli: &Cli) -> Result<()> {
    let params = IntersectionParams {
        epsilon,
        ..Default::default()
    };
    params.validate()?;

    let reference = loader::load_obj(mannequin)
        .with_context(|| format!("Failed to load mannequin from {:?}", mannequin))?;
    if reference.is_empty() {
        warn!(mannequin = %mannequin.display(), "Mannequin has no faces");
    }
    let index = CrossMeshIntersector::new(&reference, params);

    let mut results = Vec::with_capacity(apparel.len());
    for path in apparel {
        let probe = loader::load_obj(path)
            .with_context(|| format!("Failed to load apparel from {:?}", path))?;
        let result = index.probe(&probe);

        if matches!(cli.format, OutputFormat::Text) && !cli.quiet {
            let verdict = if result.intersects {
                "Yes".red().bold()
            } else {
                "No".green()
            };
            println!("Checking {} against {}...", path.display(), mannequin.display());
            println!("  Intersects: {}", verdict);
            if result.intersects {
                println!("  Intersecting faces: {}", result.faces.len());
            }
        }

        results.push(ApparelReport {
            apparel: path.display().to_string(),
            result,
        });
    }

    if matches!(cli.format, OutputFormat::Json) {
        output::print(
            &IntersectReport {
                mannequin: mannequin.display().to_string(),
                results,
            },
            cli.format,
            cli.quiet,
        );
    }

    Ok(())
}
