//! Blocking FIFO job queue.
//!
//! The queue is the only coordination point between producers (the accept
//! path) and the worker pool. One mutex and one condition variable guard a
//! `VecDeque` plus an explicit shutdown flag; every access goes through
//! [`JobQueue::enqueue`] and [`JobQueue::dequeue`].
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

#[derive(Debug)]
struct State<T> {
    jobs: VecDeque<T>,
    shutdown: bool,
}

#[derive(Debug)]
pub struct JobQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a job at the tail and wake one waiting consumer.
    ///
    /// Callable from any thread. Once [`shutdown`](JobQueue::shutdown) has
    /// been called the queue accepts no more work and the job is handed back
    /// so the producer can fail it towards the peer.
    pub fn enqueue(&self, job: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return Err(job);
        }
        state.jobs.push_back(job);
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the job at the head, blocking while the queue is
    /// empty. Returns `None` once the queue has been shut down and drained,
    /// signalling the consumer to exit.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.shutdown {
                return None;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Close the queue and wake every waiting consumer. Jobs already queued
    /// are still handed out before consumers see the end-of-work signal.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
