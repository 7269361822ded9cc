//! The mailbox processor: the default-action loop with suspend/resume.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MailboxError, TaskError};
use crate::mail::{DEFAULT_PRIORITY, MailResult, MIN_PRIORITY};
use crate::mailbox::{MailboxExecutor, PriorityMailbox};

/// Capability exposed to the default action while it runs. The only
/// operation is requesting suspension; resuming is a separate, cross-thread
/// entry point on [`MailboxProcessor`] itself.
pub struct MailboxController<'a> {
    default_action_available: &'a AtomicBool,
}

impl MailboxController<'_> {
    /// Idempotent within one iteration: the next loop iteration falls into
    /// a blocking `take(DEFAULT_PRIORITY)` instead of re-running the default
    /// action.
    pub fn suspend_default_action(&self) {
        self.default_action_available.store(false, Ordering::SeqCst);
    }
}

/// Drives a single-threaded loop on the calling (mailbox) thread:
///
/// ```text
/// loop:
///     while try_take(MIN_PRIORITY) yields a mail: run it
///     if default_action_available: run default_action(controller)
///     else: run take(DEFAULT_PRIORITY)
/// ```
///
/// The inner drain runs *every* control-priority mail before any default
/// work, guaranteeing a pending checkpoint executes before the next record.
pub struct MailboxProcessor {
    mailbox: Arc<PriorityMailbox>,
    control_executor: MailboxExecutor,
    default_action_available: Arc<AtomicBool>,
}

impl MailboxProcessor {
    pub fn new(mailbox: Arc<PriorityMailbox>) -> Self {
        let control_executor = MailboxExecutor::new(Arc::clone(&mailbox), MIN_PRIORITY, "control");
        Self {
            mailbox,
            control_executor,
            // The loop starts able to attempt default-action work; if there
            // is nothing to do yet, `run_default_action` will itself request
            // suspension on its first call.
            default_action_available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Runs the mailbox loop on the calling thread until the mailbox closes
    /// or a mail fails. `default_action` is called with a controller handle
    /// each time the loop decides default work should run.
    pub fn run_loop(
        &self,
        mut default_action: impl FnMut(&MailboxController) -> MailResult,
    ) -> Result<(), TaskError> {
        loop {
            while let Some(mail) = self.mailbox.try_take(MIN_PRIORITY) {
                self.run_mail(mail)?;
            }

            if self.default_action_available.load(Ordering::SeqCst) {
                let controller = MailboxController {
                    default_action_available: &self.default_action_available,
                };
                default_action(&controller).map_err(|source| TaskError::MailExecutionFailure {
                    label: "default_action".to_string(),
                    source,
                })?;
            } else {
                match self.mailbox.take(DEFAULT_PRIORITY) {
                    Ok(mail) => self.run_mail(mail)?,
                    Err(MailboxError::Closed) => return Ok(()),
                    Err(MailboxError::ThreadAffinityViolation { .. }) => unreachable!(
                        "take() never returns an affinity violation as a Result; it panics"
                    ),
                }
            }
        }
    }

    fn run_mail(&self, mail: crate::mail::Mail) -> Result<(), TaskError> {
        let label = mail.label().to_string();
        mail.run()
            .map_err(|source| TaskError::MailExecutionFailure { label, source })
    }

    /// The only supported cross-thread way to re-arm the loop: posts a
    /// MIN-priority mail whose body sets `default_action_available` back to
    /// `true`. Safe to call from any thread, including the thread that
    /// completes an [`crate::input_gate::AvailabilityToken`].
    pub fn resume_default_action(&self) {
        let flag = Arc::clone(&self.default_action_available);
        self.control_executor
            .execute("resume-default-action", move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
    }
}

impl fmt::Debug for MailboxProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxProcessor")
            .field("mailbox", &self.mailbox)
            .field(
                "default_action_available",
                &self.default_action_available.load(Ordering::SeqCst),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;

    #[test]
    fn p5_resume_runs_default_action_after_suspend() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let processor = Arc::new(MailboxProcessor::new(Arc::clone(&mailbox)));
        let (tx, rx) = mpsc::channel();

        let available = Mutex::new(vec![false, false, true]);
        let calls = Mutex::new(0usize);

        let processor_for_action = Arc::clone(&processor);
        let result = processor.run_loop(move |controller| {
            let mut count = calls.lock().unwrap();
            *count += 1;
            let should_suspend = !available.lock().unwrap().remove(0);
            if should_suspend {
                controller.suspend_default_action();
                let processor = Arc::clone(&processor_for_action);
                // Simulate a producer-thread wakeup arriving "later".
                std::thread::spawn(move || processor.resume_default_action());
            } else {
                tx.send(()).unwrap();
                controller.suspend_default_action();
                mailbox.close();
            }
            Ok(())
        });

        rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        result.unwrap();
    }

    #[test]
    fn p1_control_mails_drain_before_default_action_runs() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let processor = MailboxProcessor::new(Arc::clone(&mailbox));
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_for_control = Arc::clone(&order);
        mailbox.put(crate::mail::Mail::new(MIN_PRIORITY, "control", move || {
            order_for_control.lock().unwrap().push("control");
            Ok(())
        }));

        let order_for_default = Arc::clone(&order);
        let mailbox_for_close = Arc::clone(&mailbox);
        let mut iterations = 0;
        let result = processor.run_loop(move |controller| {
            order_for_default.lock().unwrap().push("default");
            iterations += 1;
            if iterations == 1 {
                controller.suspend_default_action();
                mailbox_for_close.close();
            }
            Ok(())
        });

        assert_eq!(*order.lock().unwrap(), vec!["control", "default"]);
        result.unwrap();
    }

    #[test]
    fn mail_execution_failure_terminates_the_loop() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let processor = MailboxProcessor::new(Arc::clone(&mailbox));
        mailbox.put(crate::mail::Mail::new(MIN_PRIORITY, "boom", || {
            Err("kaboom".into())
        }));

        let result = processor.run_loop(|_controller| Ok(()));
        match result {
            Err(TaskError::MailExecutionFailure { label, .. }) => assert_eq!(label, "boom"),
            Ok(()) => panic!("expected failure to propagate"),
        }
    }
}
