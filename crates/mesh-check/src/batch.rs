//! Batch checking of many meshes on a dedicated worker pool.
//!
//! Jobs run out of order; every [`BatchEntry`] carries its submission index
//! and id so consumers never depend on completion order. The driver does no
//! file I/O itself: a job either holds a soup or a loader closure that runs
//! on the worker.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::check::{CheckParams, CheckResult, CheckSet, check_with_context, isolate};
use crate::error::{MeshError, MeshResult};
use crate::progress::{CancelFlag, CheckContext};
use crate::tracing_ext::{OperationTimer, log_soup_stats};
use crate::types::TriangleSoup;

/// Worker-count setting for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Workers {
    /// One worker per available hardware thread.
    #[default]
    Auto,
    Count(NonZeroUsize),
}

impl Workers {
    /// Number of worker threads to start.
    pub fn resolve(&self) -> usize {
        match self {
            Workers::Auto => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Workers::Count(n) => n.get(),
        }
    }
}

impl FromStr for Workers {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Workers::Auto);
        }
        s.parse::<NonZeroUsize>().map(Workers::Count).map_err(|_| {
            MeshError::invalid_params(
                "workers",
                format!("expected \"auto\" or a positive integer, got '{}'", s),
            )
        })
    }
}

impl std::fmt::Display for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workers::Auto => write!(f, "auto"),
            Workers::Count(n) => write!(f, "{}", n),
        }
    }
}

impl TryFrom<String> for Workers {
    type Error = MeshError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Workers> for String {
    fn from(value: Workers) -> Self {
        value.to_string()
    }
}

/// Configuration for [`run_batch`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BatchConfig {
    pub workers: Workers,
    pub checks: CheckSet,
    pub params: CheckParams,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: Workers::Auto,
            checks: CheckSet::all(),
            params: CheckParams::default(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> MeshResult<()> {
        self.params.validate()
    }
}

/// Deferred mesh loader, run on a worker thread.
pub type Loader = Box<dyn FnOnce() -> MeshResult<TriangleSoup> + Send>;

/// Where a job's mesh comes from.
pub enum JobSource {
    Soup(TriangleSoup),
    Loader(Loader),
}

impl std::fmt::Debug for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSource::Soup(soup) => f
                .debug_struct("Soup")
                .field("faces", &soup.face_count())
                .finish(),
            JobSource::Loader(_) => f.write_str("Loader(..)"),
        }
    }
}

/// One mesh to check.
#[derive(Debug)]
pub struct BatchJob {
    pub id: String,
    pub source: JobSource,
}

impl BatchJob {
    pub fn from_soup(id: impl Into<String>, soup: TriangleSoup) -> Self {
        Self {
            id: id.into(),
            source: JobSource::Soup(soup),
        }
    }

    pub fn from_loader(
        id: impl Into<String>,
        loader: impl FnOnce() -> MeshResult<TriangleSoup> + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            source: JobSource::Loader(Box::new(loader)),
        }
    }
}

/// Result of one job.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Position of the job in the submitted list.
    pub index: usize,
    pub id: String,
    pub outcome: Result<CheckResult, MeshError>,
}

/// Destination for batch entries.
///
/// The driver serializes calls, so implementations need no locking of
/// their own.
pub trait ResultSink {
    fn record(&mut self, entry: BatchEntry) -> MeshResult<()>;
}

impl ResultSink for Vec<BatchEntry> {
    fn record(&mut self, entry: BatchEntry) -> MeshResult<()> {
        self.push(entry);
        Ok(())
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchSummary {
    pub submitted: usize,
    /// Jobs whose mesh was loaded and checked.
    pub completed: usize,
    /// Jobs whose mesh could not be loaded.
    pub failed: usize,
    /// Jobs never started because the batch was cancelled.
    pub skipped: usize,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} submitted, {} completed, {} failed, {} skipped",
            self.submitted, self.completed, self.failed, self.skipped
        )
    }
}

fn load(id: &str, source: JobSource) -> MeshResult<TriangleSoup> {
    match source {
        JobSource::Soup(soup) => Ok(soup),
        JobSource::Loader(loader) => isolate("load", loader).map_err(|err| match err {
            MeshError::AnalysisPanicked { message, .. } => MeshError::load_failed(id, message),
            other => other,
        }),
    }
}

/// Check every job on a pool of `config.workers` threads.
///
/// Once `cancel` is set, jobs that have not started are skipped and never
/// reach the sink. Jobs already running finish every requested analysis and
/// are recorded. A sink error stops the batch the same way and is returned
/// after in-flight jobs finish.
///
/// # Example
///
/// ```
/// use mesh_check::{BatchConfig, BatchEntry, BatchJob, CancelFlag, TriangleSoup, run_batch};
///
/// let jobs = vec![BatchJob::from_soup("empty", TriangleSoup::new())];
/// let mut entries: Vec<BatchEntry> = Vec::new();
/// let summary = run_batch(jobs, &BatchConfig::default(), &mut entries, &CancelFlag::new()).unwrap();
/// assert_eq!(summary.submitted, 1);
/// assert_eq!(entries[0].id, "empty");
/// ```
pub fn run_batch<S>(
    jobs: Vec<BatchJob>,
    config: &BatchConfig,
    sink: &mut S,
    cancel: &CancelFlag,
) -> MeshResult<BatchSummary>
where
    S: ResultSink + Send + ?Sized,
{
    config.validate()?;

    let workers = config.workers.resolve();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("mesh-check-{}", i))
        .build()
        .map_err(|e| MeshError::WorkerPool {
            details: e.to_string(),
        })?;

    let submitted = jobs.len();
    let _timer = OperationTimer::new("batch");
    info!(jobs = submitted, workers, "Starting batch");

    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let stop = CancelFlag::new();
    let sink = Mutex::new(sink);
    let sink_error: Mutex<Option<MeshError>> = Mutex::new(None);

    pool.install(|| {
        jobs.into_par_iter()
            .enumerate()
            .for_each(|(index, BatchJob { id, source })| {
                if cancel.is_cancelled() || stop.is_cancelled() {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                // Started jobs run to completion; only queued jobs see `cancel`
                let ctx = CheckContext::new(&id);
                let outcome = ctx.in_scope(|| {
                    let soup = load(&id, source)?;
                    log_soup_stats(&soup, "loaded");
                    Ok(check_with_context(&soup, &config.checks, &config.params, &ctx))
                });

                match &outcome {
                    Ok(_) => completed.fetch_add(1, Ordering::Relaxed),
                    Err(err) => {
                        warn!(mesh = %id, error = %err, "Batch job failed");
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };

                let entry = BatchEntry { index, id, outcome };
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(err) = sink.record(entry) {
                    warn!(error = %err, "Result sink failed, stopping batch");
                    stop.cancel();
                    sink_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(err);
                }
            });
    });

    let summary = BatchSummary {
        submitted,
        completed: completed.into_inner(),
        failed: failed.into_inner(),
        skipped: skipped.into_inner(),
    };
    debug!(%summary, "Batch finished");

    match sink_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{AnalysisStatus, CheckKind};
    use crate::test_meshes::{cube, open_cube};

    fn config(workers: usize) -> BatchConfig {
        BatchConfig {
            workers: Workers::Count(NonZeroUsize::new(workers).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_workers_parse() {
        assert_eq!("auto".parse::<Workers>().unwrap(), Workers::Auto);
        assert_eq!(
            "4".parse::<Workers>().unwrap(),
            Workers::Count(NonZeroUsize::new(4).unwrap())
        );
        assert!("0".parse::<Workers>().is_err());
        assert!("many".parse::<Workers>().is_err());
        assert!(Workers::Auto.resolve() >= 1);
        assert_eq!(Workers::Count(NonZeroUsize::new(3).unwrap()).to_string(), "3");
    }

    #[test]
    fn test_entries_carry_submission_index() {
        let jobs = vec![
            BatchJob::from_soup("closed", cube()),
            BatchJob::from_soup("open", open_cube()),
            BatchJob::from_loader("lazy", || Ok(cube())),
        ];
        let mut entries: Vec<BatchEntry> = Vec::new();
        let summary = run_batch(jobs, &config(2), &mut entries, &CancelFlag::new()).unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(entries.len(), 3);

        entries.sort_by_key(|e| e.index);
        assert_eq!(entries[0].id, "closed");
        assert!(entries[0].outcome.as_ref().unwrap().is_watertight);
        assert_eq!(entries[1].id, "open");
        assert_eq!(entries[1].outcome.as_ref().unwrap().hole_count, 1);
        assert_eq!(entries[2].id, "lazy");
    }

    #[test]
    fn test_loader_failures_are_isolated() {
        let jobs = vec![
            BatchJob::from_loader("missing", || Err(MeshError::load_failed("missing", "no such file"))),
            BatchJob::from_loader("panics", || panic!("corrupt file")),
            BatchJob::from_soup("ok", cube()),
        ];
        let mut entries: Vec<BatchEntry> = Vec::new();
        let summary = run_batch(jobs, &config(1), &mut entries, &CancelFlag::new()).unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 2);
        entries.sort_by_key(|e| e.index);
        assert!(matches!(
            entries[1].outcome,
            Err(MeshError::LoadFailed { ref details, .. }) if details == "corrupt file"
        ));
        assert!(entries[2].outcome.is_ok());
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let jobs = vec![
            BatchJob::from_soup("a", cube()),
            BatchJob::from_soup("b", cube()),
        ];
        let mut entries: Vec<BatchEntry> = Vec::new();
        let summary = run_batch(jobs, &config(2), &mut entries, &cancel).unwrap();
        assert_eq!(summary.skipped, 2);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_cancel_mid_batch_skips_queued_jobs() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let jobs = vec![
            BatchJob::from_loader("first", move || {
                trigger.cancel();
                Ok(open_cube())
            }),
            BatchJob::from_soup("second", cube()),
            BatchJob::from_soup("third", cube()),
        ];
        let mut entries: Vec<BatchEntry> = Vec::new();
        let summary = run_batch(jobs, &config(1), &mut entries, &cancel).unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(entries.len(), 1);

        let result = entries[0].outcome.as_ref().unwrap();
        assert_eq!(entries[0].id, "first");
        assert_eq!(result.statuses.len(), CheckKind::ALL.len());
        assert!(result.statuses.values().all(AnalysisStatus::is_completed));
        assert_eq!(result.hole_count, 1);
    }

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn record(&mut self, _entry: BatchEntry) -> MeshResult<()> {
            Err(MeshError::sink_failed("disk full"))
        }
    }

    #[test]
    fn test_sink_error_is_returned() {
        let jobs = vec![BatchJob::from_soup("a", cube())];
        let err = run_batch(jobs, &config(1), &mut FailingSink, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, MeshError::SinkFailed { .. }));
    }

    #[test]
    fn test_selected_checks_apply_to_every_job() {
        let config = BatchConfig {
            checks: CheckSet::empty().with(CheckKind::Holes),
            ..config(2)
        };
        let jobs = vec![
            BatchJob::from_soup("a", open_cube()),
            BatchJob::from_soup("b", open_cube()),
        ];
        let mut entries: Vec<BatchEntry> = Vec::new();
        run_batch(jobs, &config, &mut entries, &CancelFlag::new()).unwrap();
        for entry in &entries {
            let result = entry.outcome.as_ref().unwrap();
            assert_eq!(result.statuses.len(), 1);
            assert_eq!(result.hole_count, 1);
        }
    }

    #[test]
    fn test_invalid_params_rejected_up_front() {
        let mut config = config(1);
        config.params.max_faces = 0;
        let mut entries: Vec<BatchEntry> = Vec::new();
        let err = run_batch(Vec::new(), &config, &mut entries, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParams { .. }));
    }
}
