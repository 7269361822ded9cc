//! Stream task lifecycle: owns the mailbox thread and wires the processor,
//! timer service, and checkpoint scheduler together.

use std::fmt;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::checkpoint::CheckpointScheduler;
use crate::config::MailboxTaskConfig;
use crate::error::Result;
use crate::mail::{DEFAULT_PRIORITY, MIN_PRIORITY, MailResult};
use crate::mailbox::{MailboxExecutor, PriorityMailbox};
use crate::processor::{MailboxController, MailboxProcessor};
use crate::timer::ProcessingTimeService;

/// Identifies a [`StreamTaskBase`] instance in logs and test assertions;
/// it never participates in mail ordering.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// User-supplied behavior a [`StreamTaskBase`] drives. Every method runs
/// exclusively on the mailbox thread, so implementors need no internal
/// synchronization of their own state.
pub trait StreamTask: Send {
    fn run_default_action(&mut self, controller: &MailboxController) -> MailResult;
    fn perform_checkpoint(&mut self, checkpoint_id: u64) -> MailResult;
}

/// Owns the mailbox, the processor loop, and the auxiliary threads (timer
/// service, checkpoint scheduler) for one long-running stream task.
/// Construct it on whatever thread should become the mailbox thread;
/// [`Self::invoke`] must be called from that same thread.
pub struct StreamTaskBase {
    id: TaskId,
    config: MailboxTaskConfig,
    mailbox: Arc<PriorityMailbox>,
    processor: Arc<MailboxProcessor>,
    main_executor: MailboxExecutor,
    control_executor: MailboxExecutor,
    timer_service: Arc<ProcessingTimeService>,
}

impl StreamTaskBase {
    /// Captures the calling thread as the mailbox thread and starts the
    /// timer thread immediately. The checkpoint scheduler is started later,
    /// inside [`Self::invoke`], once a task is available to receive
    /// `perform_checkpoint` calls.
    pub fn new(config: MailboxTaskConfig) -> Self {
        let mailbox = Arc::new(PriorityMailbox::new(config.mailbox_fail_closed_logs));
        let processor = Arc::new(MailboxProcessor::new(Arc::clone(&mailbox)));
        let main_executor = MailboxExecutor::new(Arc::clone(&mailbox), DEFAULT_PRIORITY, "main");
        let control_executor =
            MailboxExecutor::new(Arc::clone(&mailbox), MIN_PRIORITY, "control");
        let timer_service = Arc::new(ProcessingTimeService::new(
            main_executor.clone(),
            config.timer_thread_is_daemon,
        ));

        Self {
            id: TaskId::new(),
            config,
            mailbox,
            processor,
            main_executor,
            control_executor,
            timer_service,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn mailbox(&self) -> &Arc<PriorityMailbox> {
        &self.mailbox
    }

    pub fn processor(&self) -> &Arc<MailboxProcessor> {
        &self.processor
    }

    /// Submits default-priority work (timer relays, resume requests from
    /// components outside the checkpoint path) onto this task's mailbox.
    pub fn main_executor(&self) -> &MailboxExecutor {
        &self.main_executor
    }

    /// Submits control-priority work (checkpoints, resumes) onto this
    /// task's mailbox.
    pub fn control_executor(&self) -> &MailboxExecutor {
        &self.control_executor
    }

    pub fn timer_service(&self) -> &Arc<ProcessingTimeService> {
        &self.timer_service
    }

    /// Runs `task` to completion on the calling thread, which must be the
    /// thread this `StreamTaskBase` was constructed on. Starts the
    /// checkpoint scheduler, drives the mailbox loop against `task`'s
    /// default action, and on exit — clean or via a failed mail — shuts
    /// down the timer and checkpoint threads and closes the mailbox.
    pub fn invoke(self, task: impl StreamTask + 'static) -> Result<()> {
        let task = Arc::new(Mutex::new(task));

        let checkpoint_task = Arc::clone(&task);
        let checkpoint_scheduler = CheckpointScheduler::start(
            self.config.checkpoint_interval,
            self.control_executor.clone(),
            move |checkpoint_id| {
                checkpoint_task
                    .lock()
                    .expect("task mutex poisoned")
                    .perform_checkpoint(checkpoint_id)
            },
        );

        tracing::info!(task_id = %self.id, "stream task starting");

        let default_action_task = Arc::clone(&task);
        let result = self.processor.run_loop(move |controller| {
            default_action_task
                .lock()
                .expect("task mutex poisoned")
                .run_default_action(controller)
        });

        checkpoint_scheduler.shutdown();
        self.timer_service.shutdown();
        self.mailbox.close();

        match &result {
            Ok(()) => tracing::info!(task_id = %self.id, "stream task stopped"),
            Err(error) => tracing::error!(task_id = %self.id, %error, "stream task failed"),
        }

        result
    }
}

impl fmt::Debug for StreamTaskBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTaskBase")
            .field("id", &self.id)
            .field("mailbox", &self.mailbox)
            .finish()
    }
}
