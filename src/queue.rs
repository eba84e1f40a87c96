//! Single-slot FIFO queue of video creation tasks

use crate::error::VideoCreatorError;
use crate::task::{CancellationToken, CompletionFn, VideoCreateTask};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

const WORKER_NOT_RUNNING: &str = "task queue worker is not running";

struct Job {
    id: u64,
    task: VideoCreateTask,
    completion: CompletionFn,
}

type Registry = Arc<Mutex<HashMap<u64, CancellationToken>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to one submitted task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. The task's completion reports
    /// [`VideoCreatorError::Cancelled`] unless it already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
        log::debug!("task {} cancellation requested", self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs submitted tasks one at a time, in submission order, on a dedicated
/// worker thread
///
/// Completion and progress callbacks are called on that worker thread.
/// Dropping the queue waits for every queued task; call
/// [`cancel_all`](Self::cancel_all) first to abandon them.
pub struct TaskQueue {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    registry: Registry,
    next_id: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let registry: Registry = Arc::default();

        let worker_registry = Arc::clone(&registry);
        let worker = std::thread::Builder::new()
            .name("stillvid-queue".to_string())
            .spawn(move || run_worker(receiver, worker_registry));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to spawn task queue worker: {}", e);
                None
            }
        };

        Self {
            sender: Some(sender),
            worker,
            registry,
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue `task`; `completion` is called exactly once with its result
    pub fn submit(&self, task: VideoCreateTask, completion: CompletionFn) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = task.cancellation_token();
        lock(&self.registry).insert(id, cancel.clone());

        let job = Job {
            id,
            task,
            completion,
        };
        let rejected = match &self.sender {
            Some(sender) => sender.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };
        if let Some(job) = rejected {
            lock(&self.registry).remove(&id);
            log::warn!("task {} rejected: {}", id, WORKER_NOT_RUNNING);
            (job.completion)(Err(VideoCreatorError::CanNotStartWriting(Some(
                WORKER_NOT_RUNNING.into(),
            ))));
        } else {
            log::debug!("task {} queued", id);
        }

        TaskHandle { id, cancel }
    }

    /// Cancel every queued and running task
    pub fn cancel_all(&self) {
        let registry = lock(&self.registry);
        for cancel in registry.values() {
            cancel.cancel();
        }
        log::debug!("cancelled {} tasks", registry.len());
    }

    /// Tasks submitted and not yet completed, including the running one
    pub fn pending_count(&self) -> usize {
        lock(&self.registry).len()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("task queue worker panicked");
            }
        }
    }
}

fn run_worker(jobs: Receiver<Job>, registry: Registry) {
    for Job {
        id,
        task,
        completion,
    } in jobs.iter()
    {
        log::debug!("task {} started", id);
        let result = task.run();
        lock(&registry).remove(&id);
        match &result {
            Ok(asset) => log::debug!("task {} finished: {}", id, asset.path.display()),
            Err(e) => log::debug!("task {} ended: {}", id, e),
        }
        completion(result);
    }
}
