//! The input gate: a FIFO of opaque payload buffers plus a reusable one-shot
//! "availability" completion token, giving a producer thread a lock-free way
//! to wake a suspended default action without losing wakeups.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A payload handed to [`InputGate::on_buffer`] by the producer side (the
/// on-wire framing/decoder is out of scope for this crate).
pub type Buffer = Vec<u8>;

struct TokenInner {
    completed: AtomicBool,
    waiter: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// A one-shot, reusable completion handle signalling "the input gate has at
/// least one buffer". Exactly one token exists per gate at a time; it is
/// replaced, not mutated in place, once it has been observed completed and
/// drained (see [`InputGate::poll_next`]).
#[derive(Clone)]
pub struct AvailabilityToken {
    inner: Arc<TokenInner>,
}

impl AvailabilityToken {
    fn new_pending() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                completed: AtomicBool::new(false),
                waiter: Mutex::new(None),
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Registers a continuation to run when this token completes. If the
    /// token is already completed — including the race where completion
    /// happens between an earlier `is_completed()` check and this call — the
    /// continuation runs immediately, inline, on the calling thread. This is
    /// the mechanism that prevents a lost wakeup: the caller never has to
    /// choose between "check" and "register" atomically itself.
    pub fn on_completed(&self, continuation: impl FnOnce() + Send + 'static) {
        if self.is_completed() {
            continuation();
            return;
        }
        let mut guard = self.inner.waiter.lock().expect("token mutex poisoned");
        if self.is_completed() {
            drop(guard);
            continuation();
            return;
        }
        *guard = Some(Box::new(continuation));
    }

    fn complete(&self) {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return; // already completed; idempotent.
        }
        let waiting = self
            .inner
            .waiter
            .lock()
            .expect("token mutex poisoned")
            .take();
        if let Some(continuation) = waiting {
            continuation();
        }
    }
}

impl fmt::Debug for AvailabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailabilityToken")
            .field("completed", &self.is_completed())
            .finish()
    }
}

struct GateInner {
    buffers: VecDeque<Buffer>,
    token: AvailabilityToken,
}

/// FIFO of opaque payload buffers. `on_buffer` is the producer-thread entry
/// point; `poll_next` and `availability` are called only from the task
/// thread. Access is serialized by a single mutex held briefly; the token
/// handle returned while holding it is safe to subscribe to outside it.
pub struct InputGate {
    inner: Mutex<GateInner>,
}

impl Default for InputGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InputGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                buffers: VecDeque::new(),
                token: AvailabilityToken::new_pending(),
            }),
        }
    }

    /// Callable from producer threads. Atomically enqueues and, if the
    /// token is still pending, completes it.
    pub fn on_buffer(&self, buffer: Buffer) {
        let token_to_complete = {
            let mut guard = self.inner.lock().expect("gate mutex poisoned");
            guard.buffers.push_back(buffer);
            if guard.token.is_completed() {
                None
            } else {
                Some(guard.token.clone())
            }
        };
        if let Some(token) = token_to_complete {
            token.complete();
        }
    }

    /// Callable from the task thread. Pops one buffer; if the queue is now
    /// empty and the current token is completed, replaces it with a fresh
    /// pending token atomically with the drain.
    pub fn poll_next(&self) -> Option<Buffer> {
        let mut guard = self.inner.lock().expect("gate mutex poisoned");
        let item = guard.buffers.pop_front();
        if guard.buffers.is_empty() && guard.token.is_completed() {
            guard.token = AvailabilityToken::new_pending();
        }
        item
    }

    /// Callable from the task thread. Returns the current token (pending or
    /// completed).
    pub fn availability(&self) -> AvailabilityToken {
        self.inner.lock().expect("gate mutex poisoned").token.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("gate mutex poisoned").buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InputGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(guard) => f
                .debug_struct("InputGate")
                .field("len", &guard.buffers.len())
                .field("token_completed", &guard.token.is_completed())
                .finish(),
            Err(_) => f.debug_struct("InputGate").field("state", &"<locked>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn p9_fifo_across_the_gate() {
        let gate = InputGate::new();
        gate.on_buffer(b"a".to_vec());
        gate.on_buffer(b"b".to_vec());
        assert_eq!(gate.poll_next(), Some(b"a".to_vec()));
        assert_eq!(gate.poll_next(), Some(b"b".to_vec()));
        assert_eq!(gate.poll_next(), None);
    }

    #[test]
    fn liveness_rule_token_completed_iff_buffer_present() {
        let gate = InputGate::new();
        assert!(!gate.availability().is_completed());
        gate.on_buffer(b"x".to_vec());
        assert!(gate.availability().is_completed());
        gate.poll_next();
        assert!(!gate.availability().is_completed());
    }

    #[test]
    fn token_is_replaced_only_after_drained_empty() {
        let gate = InputGate::new();
        gate.on_buffer(b"x".to_vec());
        gate.on_buffer(b"y".to_vec());
        let token_before = gate.availability();
        gate.poll_next(); // still one buffer left; token must not be replaced yet
        assert!(token_before.is_completed());
        gate.poll_next(); // now empty; token is replaced with a fresh pending one
        let token_after = gate.availability();
        assert!(!token_after.is_completed());
    }

    #[test]
    fn p5_no_lost_wakeup_across_suspend_register_race() {
        let gate = Arc::new(InputGate::new());
        let woken = Arc::new(AtomicUsize::new(0));

        let token = gate.availability();
        // Simulate the producer completing the token concurrently with the
        // consumer registering its continuation (the race spec.md calls out
        // in step 3b/3d of the default action).
        let gate_for_producer = Arc::clone(&gate);
        let producer = thread::spawn(move || {
            gate_for_producer.on_buffer(b"late".to_vec());
        });

        let woken_for_continuation = Arc::clone(&woken);
        token.on_completed(move || {
            woken_for_continuation.fetch_add(1, Ordering::SeqCst);
        });

        producer.join().unwrap();
        // Regardless of scheduling, the continuation must have fired exactly once.
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while woken.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }
}
