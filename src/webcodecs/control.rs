//! Per-codec control-message queue
//!
//! Every codec instance owns exactly one worker thread fed by an unbounded
//! channel of boxed steps. Steps run strictly FIFO; a failing step must
//! route to the instance's internal close rather than unwind, so later
//! steps (backend frees in particular) still run.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};

use super::error::{abort_error, Result};

/// Codec lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
  Unconfigured,
  Configured,
  Closed,
}

/// Lock-free cell holding a `CodecState`, readable without touching the
/// codec's work mutex
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
  pub fn new(state: CodecState) -> Self {
    Self(AtomicU8::new(state as u8))
  }

  pub fn get(&self) -> CodecState {
    match self.0.load(Ordering::Acquire) {
      0 => CodecState::Unconfigured,
      1 => CodecState::Configured,
      _ => CodecState::Closed,
    }
  }

  pub fn set(&self, state: CodecState) {
    self.0.store(state as u8, Ordering::Release);
  }
}

/// Shared bookkeeping every codec instance carries: lifecycle state, the
/// queue-depth counter and the abandonment generation bumped by reset/close.
pub(crate) struct CodecSignals {
  pub state: StateCell,
  pub queue_size: AtomicU32,
  pub epoch: AtomicU64,
}

impl CodecSignals {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      state: StateCell::new(CodecState::Unconfigured),
      queue_size: AtomicU32::new(0),
      epoch: AtomicU64::new(0),
    })
  }

  /// Current generation; steps capture this at enqueue time
  pub fn epoch(&self) -> u64 {
    self.epoch.load(Ordering::Acquire)
  }

  /// Abandon queued work: stale steps drain counters but touch nothing else
  pub fn bump_epoch(&self) {
    self.epoch.fetch_add(1, Ordering::AcqRel);
  }

  pub fn increment_queue(&self) {
    self.queue_size.fetch_add(1, Ordering::AcqRel);
  }

  pub fn decrement_queue(&self) {
    // Saturating: reset zeroes the counter while steps may still drain
    let _ = self
      .queue_size
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
        Some(n.saturating_sub(1))
      });
  }

  pub fn queue_size(&self) -> u32 {
    self.queue_size.load(Ordering::Acquire)
  }
}

type Step<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Serialized asynchronous task chain
///
/// Dropping the queue drops the sender; the worker drains what was already
/// enqueued and exits on its own. It is deliberately not joined here so
/// teardown never blocks the calling thread.
pub(crate) struct ControlQueue<S> {
  sender: Option<Sender<Step<S>>>,
  _worker: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> ControlQueue<S> {
  pub fn spawn(shared: Arc<Mutex<S>>) -> Self {
    let (sender, receiver): (Sender<Step<S>>, Receiver<Step<S>>) = channel::unbounded();
    let worker = std::thread::spawn(move || {
      while let Ok(step) = receiver.recv() {
        let mut guard: MutexGuard<'_, S> = match shared.lock() {
          Ok(guard) => guard,
          Err(poisoned) => poisoned.into_inner(),
        };
        step(&mut *guard);
      }
    });
    Self {
      sender: Some(sender),
      _worker: Some(worker),
    }
  }

  /// Append a step to the chain. Returns false once the worker is gone.
  pub fn enqueue(&self, step: impl FnOnce(&mut S) + Send + 'static) -> bool {
    match &self.sender {
      Some(sender) => sender.send(Box::new(step)).is_ok(),
      None => false,
    }
  }
}

impl<S> Drop for ControlQueue<S> {
  fn drop(&mut self) {
    self.sender = None;
  }
}

/// The caller-facing half of a flush step
///
/// `wait` blocks until the flush step resolves it. A queue torn down before
/// the step ran surfaces as an AbortError, matching close semantics.
pub struct FlushHandle {
  receiver: Receiver<Result<()>>,
}

impl FlushHandle {
  pub fn wait(self) -> Result<()> {
    match self.receiver.recv() {
      Ok(result) => result,
      Err(_) => Err(abort_error("codec closed before flush completed")),
    }
  }
}

/// Create the resolver/handle pair for one flush step
pub(crate) fn flush_channel() -> (Sender<Result<()>>, FlushHandle) {
  let (sender, receiver) = channel::bounded(1);
  (sender, FlushHandle { receiver })
}
