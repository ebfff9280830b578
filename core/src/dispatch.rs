//! The single designated callback context.
//!
//! # Design
//! Background fetchers never invoke pipeline callbacks from their own
//! threads. They post a closure through a `CallbackSender`, and the thread
//! that owns the matching `CallbackQueue` runs those closures when it drains
//! the queue. That thread is the callback context: every success and error
//! callback fires there, one at a time, in arrival order.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send>;

/// Receiving end, owned by the callback thread.
pub struct CallbackQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// Handle for fetchers to post completions through.
    pub fn sender(&self) -> CallbackSender {
        CallbackSender {
            sender: self.sender.clone(),
        }
    }

    /// Run everything already queued without waiting. Returns how many
    /// callbacks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Keep running callbacks until `done` holds or `timeout` elapses.
    /// Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.run_next(remaining) {
                return done();
            }
        }
        true
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue").finish_non_exhaustive()
    }
}

/// Posting end. Cheap to clone and safe to move to worker threads.
#[derive(Clone)]
pub struct CallbackSender {
    sender: Sender<Job>,
}

impl CallbackSender {
    /// Queue `job` for the callback thread. If the queue is gone the job is
    /// dropped; nobody is left to observe it.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            tracing::warn!("callback queue dropped; discarding completion");
        }
    }
}

impl fmt::Debug for CallbackSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSender").finish_non_exhaustive()
    }
}
