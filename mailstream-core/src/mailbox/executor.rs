use std::sync::Arc;

use super::PriorityMailbox;
use crate::mail::{Mail, MailResult};

/// A lightweight, cheaply-cloneable handle binding "submit to mailbox" with
/// a fixed priority. Typically two circulate per task: a `main` executor at
/// [`crate::mail::DEFAULT_PRIORITY`] handed to components that hop back onto
/// the task thread (e.g. the timer service), and a `control` executor at
/// [`crate::mail::MIN_PRIORITY`] handed to the checkpoint scheduler and
/// anything that must preempt data processing.
#[derive(Clone, Debug)]
pub struct MailboxExecutor {
    mailbox: Arc<PriorityMailbox>,
    priority: i32,
    label: &'static str,
}

impl MailboxExecutor {
    pub fn new(mailbox: Arc<PriorityMailbox>, priority: i32, label: &'static str) -> Self {
        Self {
            mailbox,
            priority,
            label,
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The capability's log-attribution label (e.g. `"main"`, `"control"`),
    /// distinct from the per-mail label passed to [`Self::execute`].
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Constructs a [`Mail`] at this executor's fixed priority and submits it.
    pub fn execute(&self, label: impl Into<String>, callable: impl FnOnce() -> MailResult + Send + 'static) {
        let mail = Mail::new(self.priority, label, callable);
        self.mailbox.put(mail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{DEFAULT_PRIORITY, MIN_PRIORITY};

    #[test]
    fn execute_submits_at_the_bound_priority() {
        let mailbox = Arc::new(PriorityMailbox::new(true));
        let control = MailboxExecutor::new(mailbox.clone(), MIN_PRIORITY, "control");
        let main = MailboxExecutor::new(mailbox.clone(), DEFAULT_PRIORITY, "main");

        main.execute("data", || Ok(()));
        control.execute("checkpoint", || Ok(()));

        let first = mailbox.try_take(MIN_PRIORITY).unwrap();
        assert_eq!(first.label(), "checkpoint");
        assert_eq!(first.priority(), MIN_PRIORITY);
    }
}
