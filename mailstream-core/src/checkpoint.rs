//! Checkpoint scheduler: a dedicated thread that periodically mails a
//! control-priority checkpoint request into the task's mailbox, so a
//! checkpoint always preempts queued default-action work.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::mailbox::MailboxExecutor;

struct SchedulerShared {
    lock: Mutex<bool>, // true once shutdown has been requested
    condvar: Condvar,
}

/// Fires `control_executor.execute(...)` on a fixed interval from its own
/// thread, incrementing a monotonic `checkpoint_id` per firing. The mail
/// body is the only thing that ever touches task state; the scheduler
/// thread itself only counts and sleeps.
pub struct CheckpointScheduler {
    shared: Arc<SchedulerShared>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    next_checkpoint_id: Arc<AtomicU64>,
}

impl CheckpointScheduler {
    /// Spawns the scheduler thread immediately. `on_checkpoint` is invoked
    /// with the new checkpoint id from inside a control-priority mail body,
    /// i.e. on the mailbox thread, never on the scheduler thread itself.
    pub fn start(
        interval: Duration,
        control_executor: MailboxExecutor,
        on_checkpoint: impl Fn(u64) -> crate::mail::MailResult + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(SchedulerShared {
            lock: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let next_checkpoint_id = Arc::new(AtomicU64::new(1));
        let on_checkpoint: Arc<dyn Fn(u64) -> crate::mail::MailResult + Send + Sync> =
            Arc::new(on_checkpoint);

        let worker_shared = Arc::clone(&shared);
        let worker_next_id = Arc::clone(&next_checkpoint_id);
        let handle = thread::Builder::new()
            .name("mailstream-checkpoint".to_string())
            .spawn(move || {
                Self::run(
                    worker_shared,
                    interval,
                    control_executor,
                    worker_next_id,
                    on_checkpoint,
                )
            })
            .expect("failed to spawn checkpoint thread");

        Self {
            shared,
            thread_handle: Mutex::new(Some(handle)),
            next_checkpoint_id,
        }
    }

    /// The id that will be assigned to the next checkpoint to fire.
    pub fn next_checkpoint_id(&self) -> u64 {
        self.next_checkpoint_id.load(Ordering::SeqCst)
    }

    /// Signals the scheduler thread to stop and joins it. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut shutdown = self.shared.lock.lock().expect("scheduler mutex poisoned");
            *shutdown = true;
        }
        self.shared.condvar.notify_all();
        if let Some(handle) = self.thread_handle.lock().expect("handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }

    fn run(
        shared: Arc<SchedulerShared>,
        interval: Duration,
        control_executor: MailboxExecutor,
        next_checkpoint_id: Arc<AtomicU64>,
        on_checkpoint: Arc<dyn Fn(u64) -> crate::mail::MailResult + Send + Sync>,
    ) {
        loop {
            let shutdown_requested = {
                let guard = shared.lock.lock().expect("scheduler mutex poisoned");
                let (guard, _timeout) = shared
                    .condvar
                    .wait_timeout(guard, interval)
                    .expect("scheduler condvar wait poisoned");
                *guard
            };
            if shutdown_requested {
                return;
            }

            let checkpoint_id = next_checkpoint_id.fetch_add(1, Ordering::SeqCst);
            let on_checkpoint = Arc::clone(&on_checkpoint);
            control_executor.execute(format!("checkpoint-{checkpoint_id}"), move || {
                on_checkpoint(checkpoint_id)
            });
        }
    }
}

impl fmt::Debug for CheckpointScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointScheduler")
            .field("next_checkpoint_id", &self.next_checkpoint_id())
            .finish()
    }
}

impl Drop for CheckpointScheduler {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::PriorityMailbox;
    use std::sync::mpsc;

    #[test]
    fn fires_at_roughly_the_configured_interval() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let executor =
            MailboxExecutor::new(Arc::clone(&mailbox), crate::mail::MIN_PRIORITY, "control");
        let (tx, rx) = mpsc::channel();

        let scheduler =
            CheckpointScheduler::start(Duration::from_millis(20), executor, move |id| {
                tx.send(id).unwrap();
                Ok(())
            });

        for expected_id in 1..=3u64 {
            let mail = loop {
                if let Some(mail) = mailbox.try_take(crate::mail::MIN_PRIORITY) {
                    break mail;
                }
                thread::sleep(Duration::from_millis(2));
            };
            mail.run().unwrap();
            assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), expected_id);
        }

        scheduler.shutdown();
    }

    #[test]
    fn shutdown_stops_further_firings() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let executor =
            MailboxExecutor::new(Arc::clone(&mailbox), crate::mail::MIN_PRIORITY, "control");

        let scheduler =
            CheckpointScheduler::start(Duration::from_millis(500), executor, |_id| Ok(()));
        scheduler.shutdown();

        thread::sleep(Duration::from_millis(50));
        assert!(!mailbox.has_mail());
    }
}
