//! SparSDR compressed sample stream decoding
//!
//! The compressing radio sends a stream of 32-bit words. A window starts with
//! a header word (bit 31 set) whose bit 30 says whether the window holds FFT
//! samples or per-bin averages. FFT windows are split into runs of contiguous
//! bins, each introduced by an index word and ended by a zero word.

pub mod resync;
pub mod v1;
pub mod v2;
pub mod window;

use byteorder::{ByteOrder, LittleEndian};

pub use resync::{DecoderStats, HeaderScanner, StreamDecoder};
pub use v2::V2Parser;
pub use window::{Window, WindowAssembler, WindowKind};

pub const HEADER_BIT: u32 = 0x8000_0000;
pub const AVERAGE_BIT: u32 = 0x4000_0000;
pub const TIMESTAMP_MASK: u32 = 0x3FFF_FFFF;
pub const INDEX_MASK: u32 = 0xFFFF;
pub const SEQUENCE_MASK: u32 = 0x3FFF;

/// Bytes per V2 word
pub const WORD_BYTES: usize = 4;

/// Where the parser is within a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Initial state, and after every average window
    AwaitWindowHeader,
    /// After an FFT window header
    AwaitIndexHeader,
    /// After the delimiter that ends an FFT run
    AwaitEitherHeader,
    InFftRun,
    InAverageRun,
}

/// Reasons a word did not fit the parser's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected a window header, got 0x{word:08x}")]
    MissingWindowHeader { word: u32 },

    #[error("FFT index {index} out of range for FFT size {fft_size}")]
    IndexOutOfRange { index: u32, fft_size: u32 },

    #[error("FFT index {index} does not follow previous index {previous}")]
    IndexNotIncreasing { index: u32, previous: u32 },

    #[error("expected delimiter after average window, got 0x{word:08x}")]
    MissingAverageDelimiter { word: u32 },

    #[error("FFT run passed the last bin ({fft_size})")]
    FftRunOverflow { fft_size: u32 },
}

/// Output of parsing one word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedEvent {
    FftWindowBegin { timestamp: u32 },
    FftSample { bin_index: u32, real: i16, imag: i16 },
    AverageWindowBegin { timestamp: u32 },
    AverageSample { bin_index: u32, magnitude: u32 },
    FrameEnd,
    DecodeError(DecodeError),
}

impl ParsedEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, ParsedEvent::DecodeError(_))
    }
}

/// Split little-endian bytes into words.
///
/// Bytes that do not fill a whole word are kept in `carry` and prepended to
/// the next call, so a stream can be read in arbitrarily sized blocks.
pub fn words_from_le_bytes(carry: &mut Vec<u8>, bytes: &[u8], out: &mut Vec<u32>) {
    let mut rest = bytes;
    if !carry.is_empty() {
        let need = (WORD_BYTES - carry.len()).min(rest.len());
        carry.extend_from_slice(&rest[..need]);
        rest = &rest[need..];
        if carry.len() < WORD_BYTES {
            return;
        }
        out.push(LittleEndian::read_u32(carry));
        carry.clear();
    }

    let mut chunks = rest.chunks_exact(WORD_BYTES);
    out.extend(chunks.by_ref().map(LittleEndian::read_u32));
    carry.extend_from_slice(chunks.remainder());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_from_le_bytes() {
        let mut carry = Vec::new();
        let mut words = Vec::new();
        words_from_le_bytes(&mut carry, &[0x25, 0x00, 0x00, 0x80, 0x14], &mut words);
        assert_eq!(words, vec![0x8000_0025]);
        assert_eq!(carry, vec![0x14]);

        words_from_le_bytes(&mut carry, &[0x00], &mut words);
        assert_eq!(words.len(), 1);
        assert_eq!(carry.len(), 2);

        words_from_le_bytes(&mut carry, &[0x0a, 0x00, 0xff], &mut words);
        assert_eq!(words, vec![0x8000_0025, 0x000a_0014]);
        assert_eq!(carry, vec![0xff]);
    }

    #[test]
    fn test_decode_error_display() {
        let e = DecodeError::IndexOutOfRange {
            index: 9,
            fft_size: 8,
        };
        assert_eq!(e.to_string(), "FFT index 9 out of range for FFT size 8");
    }
}
