//! End-to-end exercise of the stream task lifecycle through the public API
//! only, the way a consumer of this crate would drive it.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use mailstream_core::input_gate::{Buffer, InputGate};
use mailstream_core::mail::MailResult;
use mailstream_core::processor::{MailboxController, MailboxProcessor};
use mailstream_core::stream_input::StreamInputProcessor;
use mailstream_core::task::{StreamTask, StreamTaskBase};
use mailstream_core::MailboxTaskConfig;

struct EchoTask {
    input: StreamInputProcessor<Box<dyn FnMut(Buffer) -> MailResult + Send>>,
    processor: Arc<MailboxProcessor>,
}

impl StreamTask for EchoTask {
    fn run_default_action(&mut self, controller: &MailboxController) -> MailResult {
        self.input.run_default_action(controller, &self.processor)
    }

    fn perform_checkpoint(&mut self, _checkpoint_id: u64) -> MailResult {
        Ok(())
    }
}

#[test]
fn single_record_is_processed_then_the_task_stops_on_close() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("mailstream_core=debug")
        .try_init()
        .ok();

    let gate = Arc::new(InputGate::new());
    let (record_tx, record_rx) = mpsc::channel();
    let (mailbox_tx, mailbox_rx) = mpsc::channel();

    let gate_for_task = Arc::clone(&gate);
    let invoke_handle = thread::Builder::new()
        .name("mailbox-thread".into())
        .spawn(move || -> mailstream_core::Result<()> {
            // The base (and therefore the mailbox) must be built on the
            // thread that will call `invoke`.
            let base = StreamTaskBase::new(MailboxTaskConfig::default());
            mailbox_tx.send(Arc::clone(base.mailbox())).unwrap();
            let processor = Arc::clone(base.processor());
            let processed: Box<dyn FnMut(Buffer) -> MailResult + Send> = {
                let record_tx = record_tx.clone();
                Box::new(move |record: Buffer| {
                    record_tx.send(record).unwrap();
                    Ok(())
                })
            };
            let task = EchoTask {
                input: StreamInputProcessor::new(gate_for_task, processed),
                processor,
            };
            base.invoke(task)
        })
        .expect("failed to spawn mailbox thread");

    let mailbox = mailbox_rx
        .recv()
        .context("mailbox handle never arrived")?;
    gate.on_buffer(b"r1".to_vec());

    let record = record_rx
        .recv_timeout(Duration::from_millis(200))
        .context("record was never processed")?;
    assert_eq!(record, b"r1".to_vec());

    mailbox.close();
    invoke_handle
        .join()
        .expect("mailbox thread panicked")
        .context("task invocation failed")?;

    Ok(())
}
