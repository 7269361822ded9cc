//! `Mail` — the unit of scheduled work that flows through a task's mailbox.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Control mails (checkpoint, resume-default-action) run ahead of everything else.
pub const MIN_PRIORITY: i32 = 0;
/// Data/timer mails.
pub const DEFAULT_PRIORITY: i32 = 1;

/// The outcome of running a mail's callable. Any error terminates the owning task.
pub type MailResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq_num() -> u64 {
    NEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

/// A single unit of work submitted to a [`crate::mailbox::PriorityMailbox`].
///
/// Ordering is `(priority asc, seq_num asc)`: smaller priority overtakes
/// larger, and among mails of equal priority the one constructed earlier
/// (smaller `seq_num`) runs first. `seq_num` is a process-global monotonic
/// counter, so ordering is well-defined across every mailbox in the process.
pub struct Mail {
    callable: Box<dyn FnOnce() -> MailResult + Send>,
    priority: i32,
    seq_num: u64,
    label: String,
}

impl Mail {
    pub fn new(
        priority: i32,
        label: impl Into<String>,
        callable: impl FnOnce() -> MailResult + Send + 'static,
    ) -> Self {
        Self {
            callable: Box::new(callable),
            priority,
            seq_num: next_seq_num(),
            label: label.into(),
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Consumes the mail, running its callable to completion.
    pub fn run(self) -> MailResult {
        (self.callable)()
    }
}

impl fmt::Debug for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mail")
            .field("priority", &self.priority)
            .field("seq_num", &self.seq_num)
            .field("label", &self.label)
            .finish()
    }
}

impl PartialEq for Mail {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq_num == other.seq_num
    }
}

impl Eq for Mail {}

impl PartialOrd for Mail {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap; the mailbox wants the *smallest* `(priority,
// seq_num)` pair at the top, so comparison is inverted here rather than at
// every call site.
impl Ord for Mail {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq_num.cmp(&self.seq_num))
    }
}
