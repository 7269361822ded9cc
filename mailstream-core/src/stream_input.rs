//! The stream input processor: the default action that pops one buffer from
//! the input gate per iteration, or arranges to be woken when one arrives.

use std::sync::Arc;

use crate::input_gate::{Buffer, InputGate};
use crate::mail::MailResult;
use crate::processor::{MailboxController, MailboxProcessor};

/// User hook invoked once per popped buffer, on the mailbox thread.
/// Deserialization is out of scope here; the codec is external.
pub trait RecordProcessor: Send {
    fn process_record(&mut self, record: Buffer) -> MailResult;
}

impl<F> RecordProcessor for F
where
    F: FnMut(Buffer) -> MailResult + Send,
{
    fn process_record(&mut self, record: Buffer) -> MailResult {
        self(record)
    }
}

/// Implements the default action contract from spec.md §4.6 over an
/// [`InputGate`] and a [`RecordProcessor`].
pub struct StreamInputProcessor<R> {
    gate: Arc<InputGate>,
    record_processor: R,
}

impl<R: RecordProcessor> StreamInputProcessor<R> {
    pub fn new(gate: Arc<InputGate>, record_processor: R) -> Self {
        Self {
            gate,
            record_processor,
        }
    }

    /// 1. Poll the gate.
    /// 2. If a buffer came back, hand it to the user and return — never
    ///    loop internally; the mailbox loop calls us again.
    /// 3. Otherwise: if the token is already completed (the producer raced
    ///    us between our poll and this check), return immediately so the
    ///    next iteration finds the buffer. Otherwise suspend and register a
    ///    resume continuation on the token *before* returning — suspending
    ///    first would lose the wakeup.
    pub fn run_default_action(
        &mut self,
        controller: &MailboxController,
        processor: &Arc<MailboxProcessor>,
    ) -> MailResult {
        if let Some(buffer) = self.gate.poll_next() {
            return self.record_processor.process_record(buffer);
        }

        let token = self.gate.availability();
        if token.is_completed() {
            // GateAvailabilityRaceBenign: a buffer landed between our poll
            // and this check. Not suspending here is what lets the next
            // iteration observe it.
            return Ok(());
        }

        controller.suspend_default_action();
        let processor = Arc::clone(processor);
        token.on_completed(move || processor.resume_default_action());
        Ok(())
    }
}
