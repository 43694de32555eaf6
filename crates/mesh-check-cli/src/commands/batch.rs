//! mesh-check batch command - check every OBJ file in a folder.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use mesh_check::{
    BatchConfig, BatchEntry, BatchJob, BatchSummary, CancelFlag, CheckResult, MeshError,
    MeshResult, ResultSink, Workers, run_batch,
};
use serde::Serialize;
use tracing::info;

use super::CheckArgs;
use crate::csv::CsvWriter;
use crate::{Cli, OutputFormat, loader, output};

#[derive(Serialize)]
struct BatchReport {
    summary: BatchSummary,
    files: Vec<FileReport>,
}

#[derive(Serialize)]
struct FileReport {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Prints or tabulates each entry as it arrives and keeps it for the report.
struct CliSink<W: Write> {
    csv: Option<CsvWriter<W>>,
    entries: Vec<BatchEntry>,
    print_text: bool,
}

impl<W: Write> ResultSink for CliSink<W> {
    fn record(&mut self, entry: BatchEntry) -> MeshResult<()> {
        match &entry.outcome {
            Ok(result) => {
                if self.print_text {
                    output::print_check_result(&entry.id, result);
                }
                if let Some(csv) = &mut self.csv {
                    csv.write_row(&entry.id, result)
                        .map_err(|e| MeshError::sink_failed(e.to_string()))?;
                }
            }
            Err(err) => {
                if self.print_text {
                    println!("Checking {}...", entry.id.bold());
                    println!("  {}: {}", "Failed".red().bold(), err);
                }
                if let Some(csv) = &mut self.csv {
                    csv.write_error_row(&entry.id, &err.to_string())
                        .map_err(|e| MeshError::sink_failed(e.to_string()))?;
                }
            }
        }
        self.entries.push(entry);
        Ok(())
    }
}

/// OBJ files directly inside `folder`, sorted by name.
fn find_obj_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder {:?}", folder))?
    {
        let path = entry?.path();
        let is_obj = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"));
        if path.is_file() && is_obj {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn run(
    folder: &Path,
    csv_path: Option<&Path>,
    workers: &str,
    args: &CheckArgs,
    cli: &Cli,
) -> Result<()> {
    if !folder.is_dir() {
        bail!("{:?} is not a folder", folder);
    }

    let config = BatchConfig {
        workers: workers.parse::<Workers>()?,
        checks: args.check_set()?,
        params: args.params()?,
    };

    let files = find_obj_files(folder)?;
    info!(files = files.len(), workers = %config.workers, "Found OBJ files");

    let jobs: Vec<BatchJob> = files
        .into_iter()
        .map(|path| {
            let id = path.display().to_string();
            BatchJob::from_loader(id, move || loader::load_obj(&path))
        })
        .collect();

    let csv = match csv_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            Some(CsvWriter::new(BufWriter::new(file))?)
        }
        None => None,
    };

    let mut sink = CliSink {
        csv,
        entries: Vec::new(),
        print_text: matches!(cli.format, OutputFormat::Text) && !cli.quiet,
    };
    let summary = run_batch(jobs, &config, &mut sink, &CancelFlag::new())?;

    match cli.format {
        OutputFormat::Json => {
            let mut entries = sink.entries;
            entries.sort_by_key(|e| e.index);
            let files = entries
                .into_iter()
                .map(|entry| match entry.outcome {
                    Ok(result) => FileReport {
                        file: entry.id,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => FileReport {
                        file: entry.id,
                        result: None,
                        error: Some(err.to_string()),
                    },
                })
                .collect();
            output::print(&BatchReport { summary, files }, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!();
                println!("{}: {}", "Batch".bold(), summary);
                if let Some(path) = csv_path {
                    println!("Results saved to {}", path.display());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_files_get_a_csv_row() {
        let mut sink = CliSink {
            csv: Some(CsvWriter::new(Vec::new()).unwrap()),
            entries: Vec::new(),
            print_text: false,
        };
        sink.record(BatchEntry {
            index: 0,
            id: "ok.obj".to_string(),
            outcome: Ok(CheckResult::default()),
        })
        .unwrap();
        sink.record(BatchEntry {
            index: 1,
            id: "broken.obj".to_string(),
            outcome: Err(MeshError::load_failed("broken.obj", "bad face")),
        })
        .unwrap();

        let csv = sink.csv.take().unwrap();
        let text = String::from_utf8(csv.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("ok.obj,"));
        assert!(lines[2].starts_with("broken.obj,Error: "));
        assert_eq!(sink.entries.len(), 2);
    }
}
