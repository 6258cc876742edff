//! Bounded pool of decode workers with idle-timeout retirement.
//!
//! ```text
//! get_worker() ──► idle queue ──► reuse (terminated handles are discarded)
//!                      │ empty
//!                      ▼
//!              live < max_workers ──► spawn "decode-worker-N"
//!                      │ no
//!                      ▼
//!              block until a worker is released or retires
//!
//! worker thread: run job ─► release (next backlog job, or idle queue)
//!                idle for `idle_timeout` ─► retire (only if still queued)
//! ```
//!
//! Jobs talk to the rest of the system by message passing only; the pool never
//! shares state with the main thread beyond its own bookkeeping.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

/// Unit of work executed on a decode worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum WorkerMessage {
  Run(Job),
  Shutdown,
}

#[derive(Clone)]
struct WorkerHandle {
  id: u64,
  sender: Sender<WorkerMessage>,
  terminated: Arc<AtomicBool>,
}

impl WorkerHandle {
  #[inline]
  fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }
}

#[derive(Default)]
struct PoolState {
  idle: VecDeque<WorkerHandle>,
  backlog: VecDeque<Job>,
  live: usize,
  peak_live: usize,
  next_id: u64,
  shutdown: bool,
}

struct PoolShared {
  state: Mutex<PoolState>,
  available: Condvar,
  max_workers: usize,
  idle_timeout: Duration,
}

impl PoolShared {
  fn lock(&self) -> MutexGuard<'_, PoolState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn spawn_locked(self: &Arc<Self>, state: &mut PoolState) -> io::Result<WorkerHandle> {
    let id = state.next_id;
    let (sender, receiver) = channel::unbounded();
    let handle = WorkerHandle {
      id,
      sender,
      terminated: Arc::new(AtomicBool::new(false)),
    };

    let shared = Arc::clone(self);
    let thread_handle = handle.clone();
    thread::Builder::new()
      .name(format!("decode-worker-{id}"))
      .spawn(move || worker_main(shared, thread_handle, receiver))?;

    state.next_id += 1;
    state.live += 1;
    state.peak_live = state.peak_live.max(state.live);
    debug!(worker = id, live = state.live, "Spawned decode worker");
    Ok(handle)
  }

  /// First usable idle worker; terminated handles are dropped.
  fn pop_idle(state: &mut PoolState) -> Option<WorkerHandle> {
    while let Some(handle) = state.idle.pop_front() {
      if handle.is_terminated() {
        trace!(worker = handle.id, "Discarding terminated worker");
        continue;
      }
      return Some(handle);
    }
    None
  }

  fn acquire(self: &Arc<Self>, block: bool) -> io::Result<Option<WorkerHandle>> {
    let mut state = self.lock();
    loop {
      if let Some(handle) = Self::pop_idle(&mut state) {
        return Ok(Some(handle));
      }
      if state.live < self.max_workers {
        return self.spawn_locked(&mut state).map(Some);
      }
      if !block {
        return Ok(None);
      }
      state = self.available.wait(state).unwrap_or_else(PoisonError::into_inner);
    }
  }

  fn execute(self: &Arc<Self>, mut job: Job) -> io::Result<()> {
    let mut state = self.lock();
    loop {
      let handle = match Self::pop_idle(&mut state) {
        Some(handle) => handle,
        None if state.live < self.max_workers => self.spawn_locked(&mut state)?,
        None => {
          state.backlog.push_back(job);
          return Ok(());
        }
      };
      match handle.sender.send(WorkerMessage::Run(job)) {
        Ok(()) => return Ok(()),
        // Worker thread is gone; try the next one
        Err(channel::SendError(WorkerMessage::Run(returned))) => job = returned,
        Err(channel::SendError(WorkerMessage::Shutdown)) => return Ok(()),
      }
    }
  }

  /// Hand a worker back: give it the next backlog job, or queue it as idle.
  fn release(&self, handle: WorkerHandle) {
    if handle.is_terminated() {
      return;
    }
    let mut state = self.lock();
    if state.shutdown {
      let _ = handle.sender.send(WorkerMessage::Shutdown);
      return;
    }
    if let Some(job) = state.backlog.pop_front() {
      match handle.sender.send(WorkerMessage::Run(job)) {
        Ok(()) => return,
        Err(channel::SendError(WorkerMessage::Run(job))) => {
          state.backlog.push_front(job);
          return;
        }
        Err(channel::SendError(WorkerMessage::Shutdown)) => return,
      }
    }
    state.idle.push_back(handle);
    self.available.notify_one();
  }

  /// Remove `id` from the idle queue. False if a consumer already took it.
  fn retire_if_idle(&self, id: u64) -> bool {
    let mut state = self.lock();
    match state.idle.iter().position(|w| w.id == id) {
      Some(pos) => {
        state.idle.remove(pos);
        true
      }
      None => false,
    }
  }
}

/// Marks the worker terminated and frees its live slot when the thread exits,
/// including by panic.
struct LiveGuard {
  shared: Arc<PoolShared>,
  id: u64,
  terminated: Arc<AtomicBool>,
}

impl Drop for LiveGuard {
  fn drop(&mut self) {
    self.terminated.store(true, Ordering::Release);
    let mut state = self.shared.lock();
    state.live -= 1;
    debug!(worker = self.id, live = state.live, "Decode worker terminated");
    drop(state);
    self.shared.available.notify_all();
  }
}

fn worker_main(shared: Arc<PoolShared>, handle: WorkerHandle, receiver: Receiver<WorkerMessage>) {
  let _guard = LiveGuard {
    shared: Arc::clone(&shared),
    id: handle.id,
    terminated: Arc::clone(&handle.terminated),
  };

  loop {
    match receiver.recv_timeout(shared.idle_timeout) {
      Ok(WorkerMessage::Run(job)) => {
        job();
        shared.release(handle.clone());
      }
      Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
      Err(RecvTimeoutError::Timeout) => {
        if shared.retire_if_idle(handle.id) {
          break;
        }
        // A consumer dequeued this worker and is about to send work
      }
    }
  }
}

// =============================================================================
// Public API
// =============================================================================

/// Checked-out worker. Consume it with [`Worker::run`] or hand it back with
/// [`WorkerPool::release_worker`]. Dropping it also hands it back.
pub struct Worker {
  id: u64,
  /// `None` once `run` has handed the worker its job.
  handle: Option<WorkerHandle>,
  shared: Arc<PoolShared>,
}

impl Worker {
  fn new(handle: WorkerHandle, shared: Arc<PoolShared>) -> Self {
    Self {
      id: handle.id,
      handle: Some(handle),
      shared,
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn is_terminated(&self) -> bool {
    self.handle.as_ref().map_or(true, WorkerHandle::is_terminated)
  }

  /// Run `job` on this worker. The worker releases itself when the job ends.
  pub fn run(mut self, job: Job) -> io::Result<()> {
    let Some(handle) = self.handle.take() else {
      return self.shared.execute(job);
    };
    match handle.sender.send(WorkerMessage::Run(job)) {
      Ok(()) => Ok(()),
      Err(channel::SendError(WorkerMessage::Run(job))) => self.shared.execute(job),
      Err(channel::SendError(WorkerMessage::Shutdown)) => Ok(()),
    }
  }
}

impl Drop for Worker {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      self.shared.release(handle);
    }
  }
}

/// Bounded decode worker pool.
pub struct WorkerPool {
  shared: Arc<PoolShared>,
}

impl WorkerPool {
  pub fn new(max_workers: usize, idle_timeout: Duration) -> Self {
    Self {
      shared: Arc::new(PoolShared {
        state: Mutex::new(PoolState::default()),
        available: Condvar::new(),
        max_workers: max_workers.max(1),
        idle_timeout,
      }),
    }
  }

  #[inline]
  pub fn max_workers(&self) -> usize {
    self.shared.max_workers
  }

  /// Check out a worker, spawning one if below the limit, otherwise blocking
  /// until one is released.
  pub fn get_worker(&self) -> io::Result<Worker> {
    let handle = self.shared.acquire(true)?;
    handle
      .map(|handle| Worker::new(handle, Arc::clone(&self.shared)))
      .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "worker pool exhausted"))
  }

  /// Non-blocking [`WorkerPool::get_worker`].
  pub fn try_get_worker(&self) -> io::Result<Option<Worker>> {
    Ok(
      self
        .shared
        .acquire(false)?
        .map(|handle| Worker::new(handle, Arc::clone(&self.shared))),
    )
  }

  /// Return a checked-out worker unused; it starts its idle timeout.
  pub fn release_worker(&self, worker: Worker) {
    drop(worker);
  }

  /// Run `job` on an idle or new worker, or queue it until one frees up.
  /// Never blocks.
  pub fn execute(&self, job: Job) -> io::Result<()> {
    self.shared.execute(job)
  }

  /// Workers whose threads are currently alive.
  pub fn live_workers(&self) -> usize {
    self.shared.lock().live
  }

  pub fn idle_workers(&self) -> usize {
    self.shared.lock().idle.len()
  }

  /// Jobs waiting for a free worker.
  pub fn backlog_len(&self) -> usize {
    self.shared.lock().backlog.len()
  }

  /// Highest number of simultaneously live workers seen.
  pub fn peak_live_workers(&self) -> usize {
    self.shared.lock().peak_live
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    let mut state = self.shared.lock();
    state.shutdown = true;
    state.backlog.clear();
    for handle in state.idle.drain(..) {
      let _ = handle.sender.send(WorkerMessage::Shutdown);
    }
  }
}

#[cfg(test)]
#[path = "worker_pool_test.rs"]
mod worker_pool_test;
