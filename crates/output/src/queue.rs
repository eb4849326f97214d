// Copyright 2025-2026 CEMAXECUTER LLC

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use num_complex::Complex32;

/// Create one queue per reconstructed band
pub fn output_channels(bands: usize) -> (Vec<OutputSender>, Vec<OutputReceiver>) {
    (0..bands)
        .map(|band| {
            let (tx, rx) = channel::unbounded();
            (
                OutputSender { band, tx },
                OutputReceiver {
                    band,
                    rx,
                    pending: VecDeque::new(),
                },
            )
        })
        .unzip()
}

/// Producer side of a band's output queue. Clone it into every thread that
/// produces samples for the band.
#[derive(Clone)]
pub struct OutputSender {
    band: usize,
    tx: Sender<Vec<Complex32>>,
}

impl OutputSender {
    pub fn band(&self) -> usize {
        self.band
    }

    /// Queue a batch of samples. Returns false once the receiver is gone.
    pub fn send(&self, samples: Vec<Complex32>) -> bool {
        if samples.is_empty() {
            return true;
        }
        self.tx.send(samples).is_ok()
    }
}

/// Consumer side of a band's output queue
pub struct OutputReceiver {
    band: usize,
    rx: Receiver<Vec<Complex32>>,
    /// Samples from a batch that did not fit the last buffer
    pending: VecDeque<Complex32>,
}

impl OutputReceiver {
    pub fn band(&self) -> usize {
        self.band
    }

    /// Fill `buf` with queued samples.
    ///
    /// Waits up to `timeout` for the first sample, then takes whatever else
    /// is queued without waiting. Returns the number of samples written,
    /// 0 on timeout or when every sender has gone.
    pub fn recv_into(&mut self, buf: &mut [Complex32], timeout: Duration) -> usize {
        if buf.is_empty() {
            return 0;
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(timeout) {
                Ok(batch) => self.pending.extend(batch),
                Err(RecvTimeoutError::Timeout) => return 0,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("band {}: all producers gone", self.band);
                    return 0;
                }
            }
        }

        let mut written = 0;
        loop {
            while written < buf.len() {
                match self.pending.pop_front() {
                    Some(sample) => {
                        buf[written] = sample;
                        written += 1;
                    }
                    None => break,
                }
            }
            if written == buf.len() {
                break;
            }
            match self.rx.try_recv() {
                Ok(batch) => self.pending.extend(batch),
                Err(_) => break,
            }
        }
        written
    }

    /// True when every sender has been dropped and nothing is left to read
    pub fn is_finished(&self) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        // crossbeam has no `Receiver::is_disconnected`; a receive that is ready
        // while the channel is empty can only mean every sender is gone.
        let mut sel = crossbeam::channel::Select::new();
        sel.recv(&self.rx);
        sel.try_ready().is_ok() && self.rx.is_empty()
    }
}
