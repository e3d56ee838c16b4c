//! The worker pool and per-run statistics aggregation.
//!
//! `worker_count` long-lived tasks drain a shared job channel through the
//! retrying fetcher into a report channel. The report channel is sized to
//! the number of jobs so workers never block on publishing; reports arrive
//! in completion order, not submission order.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::fetcher::{FetchError, Fetcher, Job, JobReport, JobStats};

/// A job queue shared by the pool's workers.
pub type SharedJobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

impl Fetcher {
    /// One worker: consume jobs until the queue is closed and drained or
    /// the run is cancelled, producing one report per job.
    pub async fn run_worker(
        self: Arc<Self>,
        jobs: SharedJobQueue,
        reports: mpsc::Sender<JobReport>,
    ) {
        loop {
            if self.cancelled() {
                break;
            }
            let job = { jobs.lock().await.recv().await };
            let Some(job) = job else { break };

            let report = self.fetch_object(job).await;
            // Trip the run-wide cancel latch before publishing a fatal
            // report, so no worker dequeues another job afterwards.
            if report.fatal_error().is_some() {
                self.cancel();
            }
            if report.success {
                info!(
                    object = %report.job.address(),
                    file = report.job.local_name(),
                    bytes = report.size,
                    attempts = report.attempts.len(),
                    "fetched"
                );
            } else {
                error!(
                    object = %report.job.address(),
                    file = report.job.local_name(),
                    attempts = report.attempts.len(),
                    error = report.err.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "fetch failed"
                );
            }

            // A closed report channel means the run was aborted early.
            if reports.send(report).await.is_err() {
                break;
            }
        }
    }

    /// Run the pool over `jobs` and aggregate the reports.
    ///
    /// Retriable failures are folded into the returned statistics; a fatal
    /// error (permission denial) cancels the run the moment its report
    /// arrives and is returned unchanged. No job queued behind the fatal
    /// one is dequeued once the latch is tripped.
    pub async fn process_jobs(self: Arc<Self>, jobs: Vec<Job>) -> Result<JobStats, FetchError> {
        let total = jobs.len();
        let (job_tx, job_rx) = mpsc::channel(total.max(1));
        let (report_tx, mut report_rx) = mpsc::channel(total.max(1));

        // The queue capacity covers every job, so these sends never block.
        for job in jobs {
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let queue: SharedJobQueue = Arc::new(Mutex::new(job_rx));
        for _ in 0..self.config().worker_count.max(1) {
            tokio::spawn(Arc::clone(&self).run_worker(Arc::clone(&queue), report_tx.clone()));
        }
        drop(report_tx);

        let mut stats = JobStats::new();
        while let Some(report) = report_rx.recv().await {
            if let Some(fatal) = report.fatal_error() {
                self.cancel();
                error!(
                    object = %report.job.address(),
                    error = %fatal,
                    "aborting run on fatal error"
                );
                return Err(fatal.clone());
            }
            stats.absorb(&report);
        }

        debug_assert!(stats.files <= total);
        Ok(stats)
    }
}
