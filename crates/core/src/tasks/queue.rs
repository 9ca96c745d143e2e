//! Update-thread task queue
//!
//! Foreign threads (the injector's control channel, the UI thread) queue
//! work here; the update thread drains it once per frame.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

/// A task to execute on the update thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capacity of the task queue, also the per-frame drain limit
pub const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task queue is full")]
    Full,

    #[error("Task queue is disconnected")]
    Disconnected,
}

pub struct TaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        Self { sender, receiver }
    }

    /// Queue a task for the next frame
    ///
    /// Safe to call from any thread. A full queue drops the task.
    #[tracing::instrument(skip_all)]
    pub fn queue<F>(&self, task: F) -> Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Task queue full, dropping task");
                Err(TaskError::Full)
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("Task queue disconnected");
                Err(TaskError::Disconnected)
            }
        }
    }

    /// Run queued tasks, at most [`QUEUE_CAPACITY`] per call
    ///
    /// Called once per frame on the update thread. Returns the number of
    /// tasks run.
    #[tracing::instrument(skip_all)]
    pub fn process(&self) -> usize {
        let mut count = 0;

        while let Ok(task) = self.receiver.try_recv() {
            task();
            count += 1;

            if count >= QUEUE_CAPACITY {
                break;
            }
        }

        count
    }

    /// Number of tasks waiting
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
