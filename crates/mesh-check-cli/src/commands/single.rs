//! mesh-check single command - check one OBJ file.

use std::path::Path;

use anyhow::{Context, Result};
use mesh_check::{CheckContext, CheckResult, check_with_context};
use serde::Serialize;

use super::CheckArgs;
use crate::{Cli, OutputFormat, loader, output};

#[derive(Serialize)]
struct SingleReport<'a> {
    file: String,
    #[serde(flatten)]
    result: &'a CheckResult,
}

pub fn run(input: &Path, args: &CheckArgs, cli: &Cli) -> Result<()> {
    let checks = args.check_set()?;
    let params = args.params()?;

    let soup = loader::load_obj(input)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;

    let file = input.display().to_string();
    let ctx = CheckContext::new(&file);
    let result = check_with_context(&soup, &checks, &params, &ctx);

    match cli.format {
        OutputFormat::Json => output::print(
            &SingleReport {
                file,
                result: &result,
            },
            cli.format,
            cli.quiet,
        ),
        OutputFormat::Text => {
            if !cli.quiet {
                output::print_check_result(&file, &result);
            }
        }
    }

    Ok(())
}
