//! The priority mailbox: a thread-affine blocking queue ordered by
//! `(priority, seq_num)`, with a priority-floor `take` that lets the owning
//! loop choose between "drain everything" and "wait for data-or-better".

mod executor;

use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::error::MailboxError;
use crate::mail::Mail;

pub use executor::MailboxExecutor;

/// Observable lifecycle state of a [`PriorityMailbox`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailboxState {
    /// Accepts mail, blocks `take`.
    Open,
    /// Reserved for a future stop-with-savepoint style drain: rejects new
    /// mail but still allows `take` to drain what remains. Nothing in this
    /// crate transitions a mailbox into this state yet.
    Quiesced,
    /// Terminal. `put` drops mail, `take` raises [`MailboxError::Closed`].
    Closed,
}

/// Non-blocking debug snapshot of a mailbox, used for logging/tests only.
#[derive(Clone, Copy, Debug)]
pub struct MailboxSnapshot {
    pub len: usize,
    pub state: MailboxState,
}

struct Inner {
    heap: BinaryHeap<Mail>,
    state: MailboxState,
}

/// A thread-safe priority queue pinned to exactly one "mailbox thread"
/// captured at construction. Only that thread may call `take`/`try_take`;
/// any thread may `put` or `close`.
pub struct PriorityMailbox {
    owner_thread: ThreadId,
    owner_thread_name: String,
    inner: Mutex<Inner>,
    condvar: Condvar,
    fail_closed_logs: bool,
}

impl PriorityMailbox {
    /// Captures the calling thread as the mailbox thread.
    pub fn new(fail_closed_logs: bool) -> Self {
        let current = thread::current();
        Self {
            owner_thread: current.id(),
            owner_thread_name: current.name().unwrap_or("<unnamed>").to_string(),
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                state: MailboxState::Open,
            }),
            condvar: Condvar::new(),
            fail_closed_logs,
        }
    }

    /// Advisory, non-blocking snapshot. Callable from any thread.
    pub fn has_mail(&self) -> bool {
        !self.inner.lock().expect("mailbox mutex poisoned").heap.is_empty()
    }

    /// Non-blocking. Must be called from the mailbox thread.
    pub fn try_take(&self, floor_priority: i32) -> Option<Mail> {
        self.assert_affinity();
        let mut guard = self.inner.lock().expect("mailbox mutex poisoned");
        match guard.heap.peek() {
            Some(head) if head.priority() <= floor_priority => guard.heap.pop(),
            _ => None,
        }
    }

    /// Blocks until the head satisfies `floor_priority` or the mailbox
    /// closes. Must be called from the mailbox thread. Tolerates spurious
    /// wake-ups by re-checking the head on every wake.
    pub fn take(&self, floor_priority: i32) -> Result<Mail, MailboxError> {
        self.assert_affinity();
        let mut guard = self.inner.lock().expect("mailbox mutex poisoned");
        loop {
            if guard.state == MailboxState::Closed {
                return Err(MailboxError::Closed);
            }
            match guard.heap.peek() {
                Some(head) if head.priority() <= floor_priority => {
                    return Ok(guard.heap.pop().expect("peek just confirmed a head"));
                }
                _ => {}
            }
            guard = self
                .condvar
                .wait(guard)
                .expect("mailbox condvar wait poisoned");
        }
    }

    /// Callable from any thread. Dropped with a warning if closed or quiesced.
    pub fn put(&self, mail: Mail) {
        let mut guard = self.inner.lock().expect("mailbox mutex poisoned");
        match guard.state {
            MailboxState::Open => {
                guard.heap.push(mail);
            }
            MailboxState::Quiesced | MailboxState::Closed => {
                if self.fail_closed_logs {
                    tracing::warn!(
                        label = mail.label(),
                        priority = mail.priority(),
                        state = ?guard.state,
                        "mail dropped: mailbox does not accept new mail in this state"
                    );
                }
                return;
            }
        }
        drop(guard);
        self.condvar.notify_one();
    }

    /// Stops accepting new mail but keeps serving `take`/`try_take` over
    /// whatever remains queued. See [`MailboxState::Quiesced`].
    pub fn quiesce(&self) {
        self.inner.lock().expect("mailbox mutex poisoned").state = MailboxState::Quiesced;
    }

    /// Transitions to [`MailboxState::Closed`], drops all queued mail, and
    /// wakes every blocked taker so it observes [`MailboxError::Closed`].
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("mailbox mutex poisoned");
        guard.state = MailboxState::Closed;
        guard.heap.clear();
        drop(guard);
        self.condvar.notify_all();
    }

    pub fn debug_snapshot(&self) -> MailboxSnapshot {
        match self.inner.try_lock() {
            Ok(guard) => MailboxSnapshot {
                len: guard.heap.len(),
                state: guard.state,
            },
            Err(_) => MailboxSnapshot {
                len: 0,
                state: MailboxState::Open,
            },
        }
    }

    fn assert_affinity(&self) {
        let current = thread::current();
        if current.id() != self.owner_thread {
            let err = MailboxError::ThreadAffinityViolation {
                expected: self.owner_thread,
                expected_name: self.owner_thread_name.clone(),
                actual: current.id(),
                actual_name: current.name().unwrap_or("<unnamed>").to_string(),
            };
            panic!("{err}");
        }
    }
}

impl fmt::Debug for PriorityMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.debug_snapshot();
        f.debug_struct("PriorityMailbox")
            .field("owner_thread", &self.owner_thread)
            .field("owner_thread_name", &self.owner_thread_name)
            .field("len", &snapshot.len)
            .field("state", &snapshot.state)
            .finish()
    }
}
