use std::{sync::Arc, thread};

use log::{debug, warn};

use crate::{
    content::ContentSource,
    handler::{Job, serve_job},
    queue::JobQueue,
};

/// Hard cap on worker threads.
pub const MAX_WORKERS: usize = 1024;

/// Fixed set of worker threads serving file jobs off a shared queue.
///
/// Dropping the pool shuts the queue down, lets the workers drain whatever
/// is still queued and joins them. Only valid once producers have stopped
/// enqueueing, which the single-owner handler/queue wiring guarantees.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    queue: Arc<JobQueue<Job>>,
}

impl WorkerPool {
    /// Spawn `size` workers (clamped to `1..=MAX_WORKERS`) sharing one job
    /// queue and one content source.
    pub fn start<C>(size: usize, content: Arc<C>) -> Self
    where
        C: ContentSource + 'static,
    {
        let size = size.clamp(1, MAX_WORKERS);
        let queue = Arc::new(JobQueue::new());

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&queue), Arc::clone(&content)));
        }

        Self { workers, queue }
    }

    /// Handle producers use to feed the pool.
    pub fn queue(&self) -> Arc<JobQueue<Job>> {
        Arc::clone(&self.queue)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queue.shutdown();

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);
            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new<C>(id: usize, queue: Arc<JobQueue<Job>>, content: Arc<C>) -> Self
    where
        C: ContentSource + 'static,
    {
        // Jobs block on disk and network I/O, so each runs outside the
        // queue lock; dequeue releases it before returning.
        let thread = thread::spawn(move || {
            while let Some(job) = queue.dequeue() {
                debug!("worker {id} serving {}", job.path);
                serve_job(job, content.as_ref());
            }
            debug!("worker {id} exiting");
        });

        Self { id, thread }
    }
}
