use async_trait::async_trait;
use speechgate_core::invoker::InvokeResult;
use speechgate_core::{
    DispatcherConfig, InvokeError, JobDispatcher, JobOutcome, SynthesisJob, SynthesisRequest,
    Synthesizer,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn make_job(name: &str) -> SynthesisJob {
    let req = SynthesisRequest::new("namaste", "hindi", "female", None).unwrap();
    SynthesisJob::new(req, std::env::temp_dir().join(name)).unwrap()
}

fn config(workers: usize, cancel_on_deadline: bool) -> DispatcherConfig {
    DispatcherConfig {
        workers,
        deadline: Duration::from_secs(5),
        cancel_on_deadline,
    }
}

// Sleeps, tracking how many invocations overlap
struct SlowSynth {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowSynth {
    fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Synthesizer for SlowSynth {
    async fn synthesize(&self, _job: &SynthesisJob) -> InvokeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// Jobs named "stuck*" hang for a long time; everything else is instant.
// Records whether a stuck invocation was dropped before finishing.
struct StuckSynth {
    stuck_for: Duration,
    dropped_early: Arc<AtomicBool>,
}

struct DropFlag {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Synthesizer for StuckSynth {
    async fn synthesize(&self, job: &SynthesisJob) -> InvokeResult<()> {
        let name = job
            .output_path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.starts_with("stuck") {
            let mut guard = DropFlag {
                flag: Arc::clone(&self.dropped_early),
                armed: true,
            };
            tokio::time::sleep(self.stuck_for).await;
            guard.armed = false;
        }
        Ok(())
    }
}

struct PanickySynth;

#[async_trait]
impl Synthesizer for PanickySynth {
    async fn synthesize(&self, job: &SynthesisJob) -> InvokeResult<()> {
        if job.output_path().ends_with("boom.wav") {
            panic!("synthesizer exploded");
        }
        Ok(())
    }
}

#[tokio::test]
async fn more_jobs_than_workers_all_get_exactly_one_outcome() {
    let synth = Arc::new(SlowSynth::new(30));
    let dispatcher = JobDispatcher::start(synth.clone(), config(2, true));

    let handles: Vec<_> = (0..7)
        .map(|i| dispatcher.submit(make_job(&format!("k{}.wav", i))))
        .collect();
    let ids: std::collections::HashSet<u64> = handles.iter().map(|h| h.id()).collect();
    assert_eq!(ids.len(), 7);

    let mut successes = 0;
    for h in handles {
        if h.wait(Duration::from_secs(5)).await.is_success() {
            successes += 1;
        }
    }

    assert_eq!(successes, 7);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 7);
    assert!(synth.peak.load(Ordering::SeqCst) <= 2);
    let stats = dispatcher.stats();
    assert_eq!(stats.completed, 7);
    assert_eq!(stats.abandoned, 0);
}

#[tokio::test]
async fn outer_deadline_yields_timed_out() {
    let dispatcher = JobDispatcher::start(Arc::new(SlowSynth::new(500)), config(2, true));

    let outcome = dispatcher
        .submit(make_job("late.wav"))
        .wait(Duration::from_millis(50))
        .await;
    assert!(matches!(outcome, JobOutcome::TimedOut));
}

#[tokio::test]
async fn cancellation_frees_the_worker_slot() {
    let dropped = Arc::new(AtomicBool::new(false));
    let synth = StuckSynth {
        stuck_for: Duration::from_secs(30),
        dropped_early: Arc::clone(&dropped),
    };
    let dispatcher = JobDispatcher::start(Arc::new(synth), config(1, true));

    let first = dispatcher
        .submit(make_job("stuck-1.wav"))
        .wait(Duration::from_millis(100))
        .await;
    assert!(matches!(first, JobOutcome::TimedOut));

    let second = dispatcher
        .submit(make_job("quick.wav"))
        .wait(Duration::from_secs(2))
        .await;
    assert!(second.is_success());
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(dispatcher.stats().abandoned, 1);
}

#[tokio::test]
async fn without_cancellation_the_slot_stays_busy() {
    let dropped = Arc::new(AtomicBool::new(false));
    let synth = StuckSynth {
        stuck_for: Duration::from_millis(400),
        dropped_early: Arc::clone(&dropped),
    };
    let dispatcher = JobDispatcher::start(Arc::new(synth), config(1, false));

    let first = dispatcher
        .submit(make_job("stuck-1.wav"))
        .wait(Duration::from_millis(50))
        .await;
    assert!(matches!(first, JobOutcome::TimedOut));

    // Still queued behind the abandoned job.
    let blocked = dispatcher
        .submit(make_job("quick-1.wav"))
        .wait(Duration::from_millis(100))
        .await;
    assert!(matches!(blocked, JobOutcome::TimedOut));

    let later = dispatcher
        .submit(make_job("quick-2.wav"))
        .wait(Duration::from_secs(3))
        .await;
    assert!(later.is_success());
    assert!(!dropped.load(Ordering::SeqCst));
    assert_eq!(dispatcher.stats().abandoned, 2);
}

#[tokio::test]
async fn queued_job_abandoned_before_start_is_skipped() {
    let synth = Arc::new(SlowSynth::new(300));
    let dispatcher = JobDispatcher::start(synth.clone(), config(1, true));

    let running = dispatcher.submit(make_job("first.wav"));
    let queued = dispatcher.submit(make_job("second.wav"));
    drop(queued);

    assert!(running.wait(Duration::from_secs(2)).await.is_success());
    dispatcher.shutdown().await;
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_synthesizer_fails_the_job_but_not_the_pool() {
    let dispatcher = JobDispatcher::start(Arc::new(PanickySynth), config(1, true));

    let outcome = dispatcher.run(make_job("boom.wav")).await;
    assert!(matches!(
        outcome,
        JobOutcome::Failure(InvokeError::Interrupted(_))
    ));

    assert!(dispatcher.run(make_job("fine.wav")).await.is_success());
}
