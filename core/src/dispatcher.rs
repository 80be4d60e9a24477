//! Job dispatcher: a fixed pool of synthesis workers behind one queue.
//!
//! `submit` never blocks and never rejects; jobs wait in an unbounded queue
//! until one of the `workers` tasks picks them up. Callers wait on the
//! returned [`JobHandle`] with their own deadline, which is separate from
//! the synthesizer's internal timeout.
//!
//! When the waiting side gives up (deadline elapsed, handle dropped) and
//! `cancel_on_deadline` is set, the worker aborts the in-flight synthesis
//! and takes the next job. With it unset the worker runs the job to the
//! end and throws the outcome away, which keeps the slot busy for as long
//! as the synthesizer's own timeout allows.

use crate::invoker::{InvokeError, Synthesizer};
use crate::job::{JobOutcome, SynthesisJob};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Number of concurrent synthesis workers
    pub workers: usize,
    /// Default overall wait used by [`JobDispatcher::run`]
    pub deadline: Duration,
    /// Abort in-flight work once nobody waits for it
    pub cancel_on_deadline: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            deadline: Duration::from_secs(20),
            cancel_on_deadline: true,
        }
    }
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub queued: usize,
    pub running: usize,
    /// Outcomes handed to a waiting caller
    pub completed: usize,
    /// Jobs whose caller left before the outcome was delivered
    pub abandoned: usize,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
}

struct QueuedJob {
    id: u64,
    job: SynthesisJob,
    reply: oneshot::Sender<JobOutcome>,
    enqueued_at: Instant,
}

/// Waiting side of a submitted job.
pub struct JobHandle {
    id: u64,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the outcome for at most `deadline`.
    ///
    /// Consumes the handle: after a `TimedOut` nobody is listening any more.
    pub async fn wait(self, deadline: Duration) -> JobOutcome {
        match timeout(deadline, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                error!(target: "dispatcher", job_id = self.id, "Job dropped without an outcome");
                JobOutcome::Failure(InvokeError::Interrupted(
                    "job was dropped by the worker pool".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    target: "dispatcher",
                    job_id = self.id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Request timed out"
                );
                JobOutcome::TimedOut
            }
        }
    }
}

/// Fixed-size synthesis worker pool.
///
/// Created once at service start and shared by reference; dropping it
/// closes the queue, after which workers drain what is left and exit.
pub struct JobDispatcher {
    queue: mpsc::UnboundedSender<QueuedJob>,
    config: DispatcherConfig,
    counters: Arc<Counters>,
    next_id: AtomicU64,
    workers: Vec<JoinHandle<()>>,
}

impl JobDispatcher {
    /// Spawn the worker tasks. Must be called inside a Tokio runtime.
    pub fn start(synth: Arc<dyn Synthesizer>, config: DispatcherConfig) -> Self {
        let size = config.workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob>();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&synth),
                    Arc::clone(&counters),
                    config.cancel_on_deadline,
                ))
            })
            .collect();

        info!(
            target: "dispatcher",
            workers = size,
            deadline_ms = config.deadline.as_millis() as u64,
            cancel_on_deadline = config.cancel_on_deadline,
            "Synthesis worker pool started"
        );

        Self {
            queue: tx,
            config,
            counters,
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Enqueue a job. The returned handle resolves to exactly one outcome.
    pub fn submit(&self, job: SynthesisJob) -> JobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedJob {
            id,
            job,
            reply,
            enqueued_at: Instant::now(),
        };
        // A failed send drops the reply sender, so the handle yields a Failure.
        if self.queue.send(queued).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            error!(target: "dispatcher", job_id = id, "Worker pool is gone; job not queued");
        } else {
            debug!(target: "dispatcher", job_id = id, "Job queued");
        }

        JobHandle { id, rx }
    }

    /// Submit and wait with the configured deadline.
    pub async fn run(&self, job: SynthesisJob) -> JobOutcome {
        self.submit(job).wait(self.config.deadline).await
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queued: self.counters.queued.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            abandoned: self.counters.abandoned.load(Ordering::SeqCst),
        }
    }

    /// Close the queue and wait for the workers to finish what was queued.
    pub async fn shutdown(self) {
        let Self { queue, workers, .. } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(target: "dispatcher", error = %e, "Worker ended abnormally");
            }
        }
        info!(target: "dispatcher", "Synthesis worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    synth: Arc<dyn Synthesizer>,
    counters: Arc<Counters>,
    cancel_on_deadline: bool,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(QueuedJob {
            id,
            job,
            mut reply,
            enqueued_at,
        }) = next
        else {
            break;
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        if cancel_on_deadline && reply.is_closed() {
            counters.abandoned.fetch_add(1, Ordering::SeqCst);
            debug!(target: "dispatcher", worker_id, job_id = id, "Skipping job abandoned while queued");
            continue;
        }

        debug!(
            target: "dispatcher",
            worker_id,
            job_id = id,
            queued_ms = enqueued_at.elapsed().as_millis() as u64,
            "Job started"
        );
        counters.running.fetch_add(1, Ordering::SeqCst);

        let audio_path: PathBuf = job.output_path().to_path_buf();
        let task_synth = Arc::clone(&synth);
        // Separate task so a panicking synthesizer cannot take the worker down.
        let mut task = tokio::spawn(async move { task_synth.synthesize(&job).await });

        let joined = if cancel_on_deadline {
            tokio::select! {
                res = &mut task => Some(res),
                _ = reply.closed() => {
                    task.abort();
                    // Wait for the drop, which also kills a spawned child.
                    let _ = (&mut task).await;
                    None
                }
            }
        } else {
            Some(task.await)
        };
        counters.running.fetch_sub(1, Ordering::SeqCst);

        let Some(joined) = joined else {
            counters.abandoned.fetch_add(1, Ordering::SeqCst);
            warn!(target: "dispatcher", worker_id, job_id = id, "Caller stopped waiting; synthesis cancelled");
            continue;
        };

        let outcome = match joined {
            Ok(Ok(())) => JobOutcome::Success { audio_path },
            Ok(Err(e)) => JobOutcome::Failure(e),
            Err(e) => {
                error!(target: "dispatcher", worker_id, job_id = id, error = %e, "Synthesis task failed");
                JobOutcome::Failure(InvokeError::Interrupted(e.to_string()))
            }
        };
        let kind = outcome.kind();

        // Counted before the send so a woken caller already sees it.
        counters.completed.fetch_add(1, Ordering::SeqCst);
        if reply.send(outcome).is_ok() {
            debug!(target: "dispatcher", worker_id, job_id = id, outcome = kind, "Job finished");
        } else {
            counters.completed.fetch_sub(1, Ordering::SeqCst);
            counters.abandoned.fetch_add(1, Ordering::SeqCst);
            warn!(target: "dispatcher", worker_id, job_id = id, outcome = kind, "Outcome discarded; caller already gone");
        }
    }
    debug!(target: "dispatcher", worker_id, "Worker exiting");
}
