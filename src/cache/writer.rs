//! Debounced, coalescing writer.
//!
//! Every mutation calls [`CoalescingWriter::schedule`], which (re)arms a single
//! timer. The write runs once the mutations stop for `debounce`, or at the
//! latest `max_delay` after the first unwritten mutation, and captures whatever
//! state exists at that moment.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Timing of debounced writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
  /// Quiet period after the last mutation before writing
  pub debounce: Duration,
  /// Upper bound on how long a mutation can wait under constant churn
  pub max_delay: Duration,
}

impl Default for WriterSettings {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(500),
      max_delay: Duration::from_secs(5),
    }
  }
}

type WriteFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Shared between the handle and the background task.
struct WriteState {
  write: WriteFn,
  dirty: AtomicBool,
  /// Held for the whole capture-and-write, so writes never interleave
  serial: Mutex<()>,
}

impl WriteState {
  fn lock(&self) -> MutexGuard<'_, ()> {
    self.serial.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Run the write if anything changed since the last one. Failures are logged
  /// and dropped; the next mutation schedules another attempt.
  fn perform(&self) {
    let _serial = self.lock();
    if !self.dirty.swap(false, Ordering::SeqCst) {
      return;
    }
    match (self.write)() {
      Ok(()) => debug!("cache snapshot written"),
      Err(e) => warn!(error = %e, "cache snapshot write failed"),
    }
  }
}

pub struct CoalescingWriter {
  tx: mpsc::UnboundedSender<()>,
  state: Arc<WriteState>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl CoalescingWriter {
  /// Start the writer task. Must be called inside a tokio runtime.
  pub fn spawn<F>(settings: WriterSettings, write: F) -> Self
  where
    F: Fn() -> Result<()> + Send + Sync + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(WriteState {
      write: Arc::new(write),
      dirty: AtomicBool::new(false),
      serial: Mutex::new(()),
    });

    let task = tokio::spawn(run(rx, settings, Arc::clone(&state)));

    Self {
      tx,
      state,
      task: Mutex::new(Some(task)),
    }
  }

  /// Note a mutation and (re)arm the timer.
  pub fn schedule(&self) {
    self.state.dirty.store(true, Ordering::SeqCst);
    // Send only fails once the task is gone, in which case flush() is the only path left
    let _ = self.tx.send(());
  }

  /// Write now if there are unwritten mutations.
  pub fn flush(&self) {
    self.state.perform();
  }

  /// Run `f` with no write in progress, dropping any pending mutations.
  ///
  /// A write that already started completes before `f` runs, and nothing
  /// captured before `f` can land afterwards.
  pub fn discard_with<R>(&self, f: impl FnOnce() -> R) -> R {
    let _serial = self.state.lock();
    self.state.dirty.store(false, Ordering::SeqCst);
    f()
  }

  /// Flush pending mutations and stop the background task.
  pub fn shutdown(&self) {
    self.flush();
    if let Ok(mut task) = self.task.lock() {
      if let Some(handle) = task.take() {
        handle.abort();
      }
    }
  }
}

impl Drop for CoalescingWriter {
  fn drop(&mut self) {
    if let Ok(mut task) = self.task.lock() {
      if let Some(handle) = task.take() {
        handle.abort();
      }
    }
  }
}

async fn run(mut rx: mpsc::UnboundedReceiver<()>, settings: WriterSettings, state: Arc<WriteState>) {
  while rx.recv().await.is_some() {
    let deadline = Instant::now() + settings.max_delay;

    loop {
      let fire_at = (Instant::now() + settings.debounce).min(deadline);
      tokio::select! {
        msg = rx.recv() => {
          if msg.is_none() {
            state.perform();
            return;
          }
          // Another mutation inside the window: rearm
        }
        _ = sleep_until(fire_at) => break,
      }
    }

    state.perform();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::AtomicUsize;

  fn counting_writer(settings: WriterSettings) -> (CoalescingWriter, Arc<AtomicUsize>) {
    let writes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&writes);
    let writer = CoalescingWriter::spawn(settings, move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });
    (writer, writes)
  }

  #[tokio::test(start_paused = true)]
  async fn test_burst_produces_one_write() {
    let (writer, writes) = counting_writer(WriterSettings::default());

    for _ in 0..10 {
      writer.schedule();
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(writes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_max_delay_bounds_constant_churn() {
    let settings = WriterSettings {
      debounce: Duration::from_millis(500),
      max_delay: Duration::from_secs(2),
    };
    let (writer, writes) = counting_writer(settings);

    // A mutation every 100ms never leaves a quiet window
    for _ in 0..19 {
      writer.schedule();
      tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(writes.load(Ordering::SeqCst), 0);

    // Still churning, but the first mutation is now 2s old
    for _ in 0..2 {
      writer.schedule();
      tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_flush_writes_immediately_and_once() {
    let (writer, writes) = counting_writer(WriterSettings::default());

    writer.schedule();
    writer.flush();
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    // The armed timer finds nothing left to write
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    // Nothing dirty, nothing written
    writer.flush();
    assert_eq!(writes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_write_does_not_stop_the_writer() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let writer = CoalescingWriter::spawn(WriterSettings::default(), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Err(eyre!("quota exceeded"))
    });

    writer.schedule();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // The next mutation is attempted again
    writer.schedule();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    writer.shutdown();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_discard_drops_pending_mutations() {
    let (writer, writes) = counting_writer(WriterSettings::default());

    writer.schedule();
    let value = writer.discard_with(|| 7);
    assert_eq!(value, 7);

    tokio::time::sleep(Duration::from_secs(1)).await;
    writer.flush();
    assert_eq!(writes.load(Ordering::SeqCst), 0);
  }
}
