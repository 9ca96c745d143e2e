//! Task queue for update-thread execution
//!
//! Allows foreign threads to queue work to execute on the game's update
//! thread. Tasks are processed each frame by the plugin's frame entry point.

mod queue;

pub use queue::{Task, TaskError, TaskQueue, QUEUE_CAPACITY};
