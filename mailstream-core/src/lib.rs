//! A single-threaded, priority-mailbox runtime for a long-running stream
//! operator task.
//!
//! One OS thread — the mailbox thread — owns all task state and runs a
//! cooperative loop: drain every control-priority mail (checkpoints,
//! resumes), then either run the task's default action (poll for input,
//! process one record) or block waiting for the next mail. Timers and
//! periodic checkpoints are driven from their own threads but only ever
//! touch task state by mailing a closure back to the mailbox thread.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod input_gate;
pub mod mail;
pub mod mailbox;
pub mod processor;
pub mod stream_input;
pub mod task;
pub mod timer;

pub use checkpoint::CheckpointScheduler;
pub use config::MailboxTaskConfig;
pub use error::{MailboxError, Result, TaskError};
pub use input_gate::{AvailabilityToken, Buffer, InputGate};
pub use mail::{DEFAULT_PRIORITY, Mail, MailResult, MIN_PRIORITY};
pub use mailbox::{MailboxExecutor, MailboxSnapshot, MailboxState, PriorityMailbox};
pub use processor::{MailboxController, MailboxProcessor};
pub use stream_input::{RecordProcessor, StreamInputProcessor};
pub use task::{StreamTask, StreamTaskBase, TaskId};
pub use timer::{ProcessingTimeService, TimerCancelHandle};
