// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RefillError {
    /// The device did not deliver a buffer in time. The FPGA side has
    /// overflowed and samples were lost.
    #[error("buffer refill timed out after {0:?}")]
    Timeout(Duration),

    #[error("device error: {0}")]
    Device(String),

    #[error("refill worker has stopped")]
    Stopped,
}

/// A device whose sample buffer is refilled by a blocking call
pub trait RefillDevice: Send + 'static {
    /// Block until the hardware has produced the next buffer
    fn refill(&mut self) -> Result<Vec<u8>, RefillError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NeedsRefill,
    Refilling,
    Ready,
}

struct State {
    phase: Phase,
    buffer: Vec<u8>,
    error: Option<RefillError>,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Consumer to worker: the buffer has been taken
    needs_refill: Condvar,
    /// Worker to consumer: a new buffer is ready
    refilled: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs a device's refill on a dedicated thread so the next buffer is being
/// filled while the consumer processes the current one.
pub struct RefillBuffer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RefillBuffer {
    pub fn start<D: RefillDevice>(device: D) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                phase: Phase::NeedsRefill,
                buffer: Vec::new(),
                error: None,
                running: true,
            }),
            needs_refill: Condvar::new(),
            refilled: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("refill".to_string())
            .spawn(move || refill_loop(worker_shared, device))
            .map_err(|e| log::error!("failed to spawn refill thread: {}", e))
            .ok();
        if worker.is_none() {
            let mut state = shared.lock();
            state.running = false;
            state.error = Some(RefillError::Stopped);
        }
        Self { shared, worker }
    }

    /// Wait up to `timeout` for the next buffer.
    ///
    /// A timeout is not retried: the stream has lost samples and the caller
    /// must restart the capture.
    pub fn next_buffer(&self, timeout: Duration) -> Result<Vec<u8>, RefillError> {
        let state = self.shared.lock();
        let (mut state, result) = self
            .shared
            .refilled
            .wait_timeout_while(state, timeout, |s| {
                s.phase != Phase::Ready && s.error.is_none() && s.running
            })
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(e) = state.error.take() {
            return Err(e);
        }
        if state.phase != Phase::Ready {
            if !state.running {
                return Err(RefillError::Stopped);
            }
            if result.timed_out() {
                log::warn!("refill timed out after {:?}", timeout);
                return Err(RefillError::Timeout(timeout));
            }
        }

        let buffer = std::mem::take(&mut state.buffer);
        state.phase = Phase::NeedsRefill;
        self.shared.needs_refill.notify_one();
        Ok(buffer)
    }
}

impl Drop for RefillBuffer {
    fn drop(&mut self) {
        self.shared.lock().running = false;
        self.shared.needs_refill.notify_all();
        self.shared.refilled.notify_all();
        if let Some(worker) = self.worker.take() {
            // A refill already in progress finishes before the worker exits
            if worker.join().is_err() {
                log::error!("refill thread panicked");
            }
        }
    }
}

fn refill_loop<D: RefillDevice>(shared: Arc<Shared>, mut device: D) {
    log::debug!("refill thread started");
    loop {
        {
            let mut state = shared.lock();
            while state.running && state.phase != Phase::NeedsRefill {
                state = shared
                    .needs_refill
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !state.running {
                break;
            }
            state.phase = Phase::Refilling;
        }

        let result = device.refill();

        let mut state = shared.lock();
        let failed = match result {
            Ok(buffer) => {
                state.buffer = buffer;
                state.phase = Phase::Ready;
                false
            }
            Err(e) => {
                log::error!("refill failed: {}", e);
                state.error = Some(e);
                state.running = false;
                true
            }
        };
        drop(state);
        shared.refilled.notify_all();
        if failed {
            break;
        }
    }
    log::debug!("refill thread exiting");
}
