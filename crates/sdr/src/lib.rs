pub mod file;
pub mod pipe;
pub mod ring;

use crossbeam::channel::Sender;

pub use file::CompressedFileSource;
pub use pipe::{NamedPipeMultiplexer, PipeError, ReadOutcome};
pub use ring::{RefillBuffer, RefillDevice, RefillError};

/// A block of raw compressed stream bytes
pub struct SampleBuf {
    /// Bytes as produced by the radio, little-endian words
    pub data: Vec<u8>,
    /// Byte offset of `data[0]` from the start of the stream
    pub offset: u64,
}

/// Errors from a compressed sample source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Read(#[from] std::io::Error),
}

/// Common trait for sources of compressed samples
pub trait CompressedSource: Send {
    /// Stream blocks into the channel.
    /// Runs until stop() is called, the input ends or an error occurs.
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<(), SourceError>;

    /// Signal the source to stop streaming. Safe to call from another thread
    /// through a shared reference.
    fn stop(&self);

    /// Capture sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Capture center frequency in Hz
    fn center_frequency(&self) -> u64;
}
