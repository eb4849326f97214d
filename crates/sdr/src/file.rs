// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::{CompressedSource, SampleBuf, SourceError};

/// Compressed capture reader: reads a recorded stream and sends it as
/// SampleBuf blocks.
pub struct CompressedFileSource {
    path: String,
    sample_rate: u32,
    center_freq: u64,
    /// Bytes per block, a multiple of the 4-byte word size
    block_size: usize,
    running: Arc<AtomicBool>,
}

impl CompressedFileSource {
    pub fn new(path: impl Into<String>, sample_rate: u32, center_freq: u64) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            center_freq,
            block_size: 256 * 1024,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the block size in bytes. Rounded down to whole words.
    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = (size & !3).max(4);
    }

    /// Flag that stops the reader when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Fill `buf` as far as possible. Returns the byte count, 0 at EOF.
    fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl CompressedSource for CompressedFileSource {
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<(), SourceError> {
        let file = File::open(Path::new(&self.path)).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "reading compressed samples from {} ({} Hz, {} MHz)",
            self.path,
            self.sample_rate,
            self.center_freq / 1_000_000
        );

        let mut offset = 0u64;
        while self.running.load(Ordering::SeqCst) {
            let mut data = vec![0u8; self.block_size];
            let n = Self::read_block(&mut reader, &mut data)?;
            if n == 0 {
                log::info!("end of file: {} ({} bytes)", self.path, offset);
                break;
            }
            if n % 4 != 0 {
                log::warn!("{}: {} trailing bytes do not form a word", self.path, n % 4);
            }
            data.truncate(n);
            if tx.send(SampleBuf { data, offset }).is_err() {
                break; // receiver dropped
            }
            offset += n as u64;
        }

        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn center_frequency(&self) -> u64 {
        self.center_freq
    }
}
