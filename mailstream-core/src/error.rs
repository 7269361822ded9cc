//! Error kinds for the mailbox runtime.
//!
//! `MailboxError::ThreadAffinityViolation` is never returned through a
//! `Result` — per the runtime's contract, a thread-affinity mismatch on
//! `take`/`try_take` is a programmer error and is reported by panicking with
//! this variant's `Display` output (see `mailbox::PriorityMailbox::assert_affinity`).
//! It still lives in this enum so tests can construct and format it directly.

use std::thread::ThreadId;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("mailbox closed")]
    Closed,

    #[error(
        "mailbox thread-affinity violation: take/try_take called from thread {actual:?} (\"{actual_name}\"), expected mailbox thread {expected:?} (\"{expected_name}\")"
    )]
    ThreadAffinityViolation {
        expected: ThreadId,
        expected_name: String,
        actual: ThreadId,
        actual_name: String,
    },
}

/// Terminal failure of a stream task's `invoke()` loop.
///
/// A mail (including a checkpoint mail or a timer-relay mail) that fails
/// terminates the task; there is no automatic retry. `MailboxClosed`
/// reaching a blocked `take` is *not* an error (it is normal shutdown) and
/// therefore has no variant here.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("mail \"{label}\" failed: {source}")]
    MailExecutionFailure {
        label: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, TaskError>;
