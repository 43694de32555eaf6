//! Output helpers shared by the subcommands.

use colored::Colorize;
use mesh_check::CheckResult;
use serde::Serialize;

use crate::OutputFormat;

/// Print a serializable value in the requested format.
///
/// Text callers print their own layout; this handles JSON.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}: failed to serialize output: {}", "Error".red().bold(), e),
        },
        OutputFormat::Text => {}
    }
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value { "Yes".green() } else { "No".red() }
}

fn count(value: usize) -> colored::ColoredString {
    if value == 0 {
        value.to_string().green()
    } else {
        value.to_string().yellow()
    }
}

/// Print the per-file summary block.
pub fn print_check_result(file: &str, result: &CheckResult) {
    println!("Checking {}...", file.bold());
    println!("  Watertight: {}", yes_no(result.is_watertight));
    println!(
        "  Non-manifold vertices: {}",
        count(result.non_manifold_vertex_count)
    );
    println!("  Self-intersections: {}", count(result.self_intersection_count));
    println!("  Holes: {}", count(result.hole_count));
    println!("  Degenerate faces: {}", count(result.degenerate_face_count));
    println!(
        "  Has UVs: {}",
        if result.has_uvs { "Yes".normal() } else { "No".normal() }
    );
    if result.has_uvs {
        println!("  Overlapping UVs: {}", count(result.overlapping_uv_count));
        println!("  UVs out of bounds: {}", count(result.uv_out_of_bounds_count));
    }
    for (kind, status) in &result.statuses {
        if !status.is_completed() {
            println!("  {} {}: {}", "!".yellow().bold(), kind, status);
        }
    }
}
