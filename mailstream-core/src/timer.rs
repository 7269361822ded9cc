//! Processing-time service: a dedicated timer thread whose firings are
//! mailed back to the task thread rather than invoked directly, since the
//! user callback observes task state that may only be touched there.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::mail::MailResult;
use crate::mailbox::MailboxExecutor;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as i64
}

/// Cheap, `Copy` cancellation token for a registered timer. Cancellation is
/// best-effort: a firing already in flight (the mail has already been
/// enqueued) still runs, per spec.md §4.7/§4.12.
#[derive(Clone, Debug)]
pub struct TimerCancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerCancelHandle {
    /// Prevents the mail from being enqueued, if the timer hasn't fired yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct ScheduledTimer {
    trigger_ts: i64,
    id: u64,
    cancelled: Arc<AtomicBool>,
    callback: Option<Box<dyn FnOnce(i64) -> MailResult + Send>>,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.trigger_ts == other.trigger_ts && self.id == other.id
    }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Min-heap by trigger timestamp, tie-broken by id for determinism.
impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .trigger_ts
            .cmp(&self.trigger_ts)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct TimerState {
    heap: BinaryHeap<ScheduledTimer>,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    condvar: Condvar,
    main_executor: MailboxExecutor,
    next_id: AtomicU64,
}

/// Off-task timer wheel. `register_timer` may be called from any thread;
/// firings are relayed to the owning task's mailbox as DEFAULT-priority
/// mails, never invoked directly from the timer thread.
pub struct ProcessingTimeService {
    shared: Arc<TimerShared>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    join_on_shutdown: bool,
}

impl ProcessingTimeService {
    /// `daemon` mirrors spec.md's `timer_thread_is_daemon` config option.
    /// Rust has no native "daemon thread blocks process exit" concept, so
    /// it is wired to whether `shutdown()` joins the thread: `true` means
    /// the thread is left to die on its own (process exit is never blocked
    /// on it), `false` means `shutdown()` waits for it to stop.
    pub fn new(main_executor: MailboxExecutor, daemon: bool) -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
            main_executor,
            next_id: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("mailstream-timer".to_string())
            .spawn(move || Self::run(worker))
            .expect("failed to spawn timer thread");

        Self {
            shared,
            thread_handle: Mutex::new(Some(handle)),
            join_on_shutdown: !daemon,
        }
    }

    pub fn current_processing_time(&self) -> i64 {
        now_millis()
    }

    /// Registers a callback to fire at or after `trigger_ts` (milliseconds,
    /// same epoch as [`Self::current_processing_time`]). A trigger in the
    /// past fires as soon as the timer thread next wakes.
    pub fn register_timer(
        &self,
        trigger_ts: i64,
        callback: impl FnOnce(i64) -> MailResult + Send + 'static,
    ) -> TimerCancelHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.shared.state.lock().expect("timer mutex poisoned");
            state.heap.push(ScheduledTimer {
                trigger_ts,
                id,
                cancelled: Arc::clone(&cancelled),
                callback: Some(Box::new(callback)),
            });
        }
        self.shared.condvar.notify_one();
        TimerCancelHandle { cancelled }
    }

    /// Stops accepting progress; in-flight firings may still enqueue their
    /// relay mail (best-effort, per spec.md).
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().expect("timer mutex poisoned");
            state.shutdown = true;
        }
        self.shared.condvar.notify_all();
        if self.join_on_shutdown
            && let Some(handle) = self.thread_handle.lock().expect("handle mutex poisoned").take()
        {
            let _ = handle.join();
        }
    }

    fn run(shared: Arc<TimerShared>) {
        loop {
            let due = {
                let mut state = shared.state.lock().expect("timer mutex poisoned");
                loop {
                    if state.shutdown {
                        return;
                    }
                    match state.heap.peek() {
                        None => {
                            state = shared
                                .condvar
                                .wait(state)
                                .expect("timer condvar wait poisoned");
                        }
                        Some(top) => {
                            let now = now_millis();
                            if top.trigger_ts <= now {
                                break;
                            }
                            let wait_for = Duration::from_millis((top.trigger_ts - now) as u64);
                            let (next_state, _timeout) = shared
                                .condvar
                                .wait_timeout(state, wait_for)
                                .expect("timer condvar wait poisoned");
                            state = next_state;
                        }
                    }
                }

                let now = now_millis();
                let mut due = Vec::new();
                while let Some(top) = state.heap.peek() {
                    if top.trigger_ts <= now {
                        due.push(state.heap.pop().expect("peek just confirmed a head"));
                    } else {
                        break;
                    }
                }
                due
            };

            let fire_ts = now_millis();
            for mut entry in due {
                if entry.cancelled.load(Ordering::SeqCst) {
                    continue;
                }
                let callback = entry.callback.take().expect("callback set at registration");
                let label = format!("timer-{}", entry.id);
                shared
                    .main_executor
                    .execute(label, move || callback(fire_ts));
            }
        }
    }
}

impl fmt::Debug for ProcessingTimeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.state.try_lock() {
            Ok(state) => f
                .debug_struct("ProcessingTimeService")
                .field("pending_timers", &state.heap.len())
                .field("shutdown", &state.shutdown)
                .finish(),
            Err(_) => f
                .debug_struct("ProcessingTimeService")
                .field("state", &"<locked>")
                .finish(),
        }
    }
}

impl Drop for ProcessingTimeService {
    fn drop(&mut self) {
        if self
            .thread_handle
            .lock()
            .expect("handle mutex poisoned")
            .is_some()
        {
            self.shutdown();
        }
    }
}
