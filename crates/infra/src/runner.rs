//! Background runner for periodic jobs (fraud scan, retention sweep).

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

/// A unit of periodic work.
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One run. Errors are logged and retried with backoff; they never stop the schedule.
    fn run_once(&self) -> anyhow::Result<()>;

    /// Called once per tick when the run and every retry have failed.
    fn on_exhausted(&self, _error: &anyhow::Error) {}
}

impl<J> ScheduledJob for Arc<J>
where
    J: ScheduledJob,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn run_once(&self) -> anyhow::Result<()> {
        (**self).run_once()
    }

    fn on_exhausted(&self, error: &anyhow::Error) {
        (**self).on_exhausted(error)
    }
}

/// Config for a periodic job runner.
#[derive(Debug, Clone)]
pub struct JobRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            max_retries: 3,
            base_backoff: Duration::from_millis(250),
        }
    }
}

/// Handle for a running job thread (shutdown + trigger hook).
#[derive(Debug)]
pub struct JobRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl JobRunnerHandle {
    /// Request an out-of-schedule run.
    ///
    /// Triggers are coalesced (bounded queue). If a run is already pending,
    /// this becomes a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Gracefully stop the runner thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl JobRunner {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Spawn a named thread running `job`.
    ///
    /// - Runs once on startup, then every `interval`
    /// - `handle.trigger()` requests an extra run
    /// - Failures (panics included): logged + retried with bounded exponential
    ///   backoff, then handed to `on_exhausted`; never propagate
    pub fn spawn<J>(&self, job: J) -> io::Result<JobRunnerHandle>
    where
        J: ScheduledJob,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let cfg = self.clone();
        let join = thread::Builder::new()
            .name(job.name().to_string())
            .spawn(move || runner_loop(cfg, shutdown_rx, trigger_rx, job))?;

        Ok(JobRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        })
    }
}

fn runner_loop<J>(
    cfg: JobRunner,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    job: J,
) where
    J: ScheduledJob,
{
    let name = job.name();
    info!(runner = name, interval_secs = cfg.interval.as_secs(), "job runner started");

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true; // run once on startup
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        // Shutdown has priority.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            // Keep a stable cadence even if we were delayed.
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        // Non-blocking drain to coalesce multiple triggers.
        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;

        match run_guarded(&job) {
            Ok(()) => failures = 0,
            Err(e) => {
                warn!(runner = name, error = ?e, attempt = failures + 1, "scheduled job failed");
                failures += 1;
                if failures <= cfg.max_retries {
                    pending = true;
                    backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
                } else {
                    // Give up until the next tick.
                    error!(runner = name, error = ?e, "scheduled job failed after retries");
                    job.on_exhausted(&e);
                    failures = 0;
                }
            }
        }
    }

    info!(runner = name, "job runner stopped");
}

/// Run once, turning a panic into an error so the thread survives it.
fn run_guarded<J>(job: &J) -> anyhow::Result<()>
where
    J: ScheduledJob,
{
    panic::catch_unwind(AssertUnwindSafe(|| job.run_once())).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(anyhow::anyhow!("{} panicked: {msg}", job.name()))
    })
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 10s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        runs: AtomicU32,
        fail_first: u32,
    }

    impl ScheduledJob for Counting {
        fn name(&self) -> &'static str {
            "counting-job"
        }

        fn run_once(&self) -> anyhow::Result<()> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                anyhow::bail!("run {n} failed");
            }
            Ok(())
        }
    }

    fn wait_for(pred: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        pred()
    }

    #[test]
    fn runs_on_start_and_on_trigger() {
        let job = Arc::new(Counting {
            runs: AtomicU32::new(0),
            fail_first: 0,
        });
        let handle = JobRunner::every(Duration::from_secs(3600))
            .spawn(job.clone())
            .unwrap();

        assert!(wait_for(|| job.runs.load(Ordering::SeqCst) == 1));
        handle.trigger();
        assert!(wait_for(|| job.runs.load(Ordering::SeqCst) == 2));
        handle.shutdown();
    }

    #[test]
    fn retries_failures_with_backoff() {
        let job = Arc::new(Counting {
            runs: AtomicU32::new(0),
            fail_first: 2,
        });
        let runner = JobRunner {
            interval: Duration::from_secs(3600),
            max_retries: 3,
            base_backoff: Duration::from_millis(10),
        };
        let handle = runner.spawn(job.clone()).unwrap();

        assert!(wait_for(|| job.runs.load(Ordering::SeqCst) == 3));
        handle.shutdown();
    }

    struct AlwaysFailing {
        runs: AtomicU32,
        exhausted: AtomicU32,
        panics: bool,
    }

    impl ScheduledJob for AlwaysFailing {
        fn name(&self) -> &'static str {
            "failing-job"
        }

        fn run_once(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("boom");
            }
            anyhow::bail!("down")
        }

        fn on_exhausted(&self, _error: &anyhow::Error) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn failing(panics: bool) -> Arc<AlwaysFailing> {
        Arc::new(AlwaysFailing {
            runs: AtomicU32::new(0),
            exhausted: AtomicU32::new(0),
            panics,
        })
    }

    fn fast_runner() -> JobRunner {
        JobRunner {
            interval: Duration::from_secs(3600),
            max_retries: 3,
            base_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn exhausted_retries_are_reported_once_per_tick() {
        let job = failing(false);
        let handle = fast_runner().spawn(job.clone()).unwrap();

        assert!(wait_for(|| job.exhausted.load(Ordering::SeqCst) == 1));
        assert_eq!(job.runs.load(Ordering::SeqCst), 4);

        handle.trigger();
        assert!(wait_for(|| job.exhausted.load(Ordering::SeqCst) == 2));
        handle.shutdown();
        assert_eq!(job.runs.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn panicking_job_does_not_stop_the_schedule() {
        let job = failing(true);
        let handle = fast_runner().spawn(job.clone()).unwrap();

        assert!(wait_for(|| job.exhausted.load(Ordering::SeqCst) == 1));
        handle.trigger();
        assert!(wait_for(|| job.exhausted.load(Ordering::SeqCst) == 2));
        handle.shutdown();
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(Duration::from_millis(100), 1), Duration::from_millis(100));
        assert_eq!(backoff(Duration::from_millis(100), 3), Duration::from_millis(400));
        assert_eq!(backoff(Duration::from_millis(100), 30), Duration::from_secs(10));
    }
}
