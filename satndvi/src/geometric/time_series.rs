use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::collect::global_variables::{DEFAULT_SCALE, DEFAULT_WORKERS};
use crate::collect::SessionFactory;
use crate::error::{NdviError, Result};
use crate::geo_core::Roi;
use crate::geometric::vegetation;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

type Session<F> = std::result::Result<<F as SessionFactory>::Session, String>;

/// What happened to one year
#[derive(Debug)]
pub struct YearOutcome {
    pub year: i32,
    pub result: Result<PathBuf>,
}

/// Outcome of every requested year, in increasing year order
#[derive(Debug)]
pub struct RunReport {
    outcomes: Vec<YearOutcome>,
}

impl RunReport {
    pub fn outcomes(&self) -> &[YearOutcome] {
        &self.outcomes
    }

    /// Files written, in year order
    pub fn succeeded(&self) -> Vec<(i32, &Path)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|p| (o.year, p.as_path())))
            .collect()
    }

    pub fn failures(&self) -> Vec<(i32, &NdviError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.year, e)))
            .collect()
    }

    /// Failure of the earliest failed year
    pub fn first_failure(&self) -> Option<&NdviError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// All written paths, or the earliest failure
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        self.outcomes.into_iter().map(|o| o.result).collect()
    }
}

/// Run the per-year task for every year on a pool of `worker_count` threads
///
/// Each worker opens its own session through `factory` before its first year; a
/// session that cannot be opened fails the years given to that worker. Years are
/// independent: a failed year never stops the others, and every year has finished
/// (written or failed) when this returns. Duplicate years are processed once.
pub fn run_all<F>(
    factory: &F,
    years: &[i32],
    roi: &Roi,
    tiff_dir: &Path,
    scale: u32,
    worker_count: usize,
) -> Result<RunReport>
where
    F: SessionFactory,
    F::Session: Send,
{
    let mut years = years.to_vec();
    years.sort_unstable();
    years.dedup();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count.max(1))
        .thread_name(|i| format!("ndvi-worker-{}", i))
        .build()?;

    info!(
        years = years.len(),
        workers = worker_count.max(1),
        place = roi.name(),
        "processing years"
    );

    #[cfg(feature = "indicatif")]
    let pb = {
        let pb = ProgressBar::new(years.len() as u64);
        pb.set_style(progress_style());
        pb.set_message("years");
        pb
    };

    // One slot per pool thread; a worker connects on its first year and keeps the session
    let sessions: Vec<Mutex<Option<Session<F>>>> = (0..pool.current_num_threads())
        .map(|_| Mutex::new(None))
        .collect();

    let mut outcomes: Vec<YearOutcome> = pool.install(|| {
        years
            .par_iter()
            .with_max_len(1)
            .map(|&year| {
                let index = rayon::current_thread_index().unwrap_or(0) % sessions.len();
                let mut slot = sessions[index]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let session =
                    slot.get_or_insert_with(|| factory.connect().map_err(|e| e.to_string()));

                let result = match session {
                    Ok(session) => vegetation::run_year(&*session, year, roi, tiff_dir, scale),
                    Err(reason) => Err(NdviError::Session {
                        year,
                        reason: reason.clone(),
                    }),
                };
                if let Err(ref e) = result {
                    warn!(year, error = %e, "year failed");
                }
                #[cfg(feature = "indicatif")]
                pb.inc(1);
                YearOutcome { year, result }
            })
            .collect()
    });

    #[cfg(feature = "indicatif")]
    pb.finish_with_message("years done");

    outcomes.sort_by_key(|o| o.year);
    let report = RunReport { outcomes };

    let failed = report.failures();
    if failed.is_empty() {
        info!(years = report.outcomes.len(), "all years exported");
    } else {
        error!(
            failed = failed.len(),
            years = ?failed.iter().map(|(y, _)| *y).collect::<Vec<_>>(),
            "some years failed"
        );
    }

    Ok(report)
}

/// Yearly NDVI of one region
///
/// Holds the run settings; `run` hands them to `run_all` with a session factory.
#[derive(Debug, Clone)]
pub struct NdviTimeSeries {
    roi: Roi,
    /// Directory receiving `ndvi_<year>.tif`
    output_path: PathBuf,
    years: Vec<i32>,
    scale: u32,
    workers: usize,
}

impl NdviTimeSeries {
    /// No years yet, `DEFAULT_SCALE` metres per pixel, `DEFAULT_WORKERS` workers
    pub fn new(roi: Roi, output_path: impl Into<PathBuf>) -> Self {
        NdviTimeSeries {
            roi,
            output_path: output_path.into(),
            years: Vec::new(),
            scale: DEFAULT_SCALE,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Every year from `start_year` to `end_year`, both included
    pub fn set_years(&mut self, start_year: i32, end_year: i32) {
        self.years = (start_year..=end_year).collect();
    }

    pub fn set_scale(&mut self, scale: u32) {
        self.scale = scale;
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers;
    }

    pub fn run<F>(&self, factory: &F) -> Result<RunReport>
    where
        F: SessionFactory,
        F::Session: Send,
    {
        run_all(
            factory,
            &self.years,
            &self.roi,
            &self.output_path,
            self.scale,
            self.workers,
        )
    }

    pub fn get_years(&self) -> &[i32] {
        &self.years
    }

    pub fn get_output_path(&self) -> &Path {
        &self.output_path
    }
}
