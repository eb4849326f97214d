// Copyright 2025-2026 CEMAXECUTER LLC

use crate::v2::V2Parser;
use crate::{ParsedEvent, HEADER_BIT};

/// Finds the next window header: a word with the header bit set that
/// directly follows a zero word.
///
/// State carries across calls, so a zero at the end of one block and a
/// header at the start of the next are recognized.
#[derive(Debug, Clone)]
pub struct HeaderScanner {
    after_zero: bool,
}

impl HeaderScanner {
    /// A scanner at the start of a stream, which counts as a delimiter
    pub fn new() -> Self {
        Self { after_zero: true }
    }

    /// Restart the scan at a word that failed to parse.
    ///
    /// The failing word itself never counts as a header.
    pub fn restart(&mut self) {
        self.after_zero = false;
    }

    /// Returns true if `word` is a header that can start parsing
    pub fn accept(&mut self, word: u32) -> bool {
        if self.after_zero && word & HEADER_BIT != 0 {
            return true;
        }
        self.after_zero = word == 0;
        false
    }

    /// Position of the first acceptable header in `words`
    pub fn find_header(&mut self, words: &[u32]) -> Option<usize> {
        words.iter().position(|&w| self.accept(w))
    }
}

impl Default for HeaderScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by a [`StreamDecoder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub words: u64,
    pub events: u64,
    pub decode_errors: u64,
    pub resyncs: u64,
    /// Words passed over while looking for a header
    pub skipped_words: u64,
}

/// V2 parser with automatic resynchronization
///
/// Feed words in blocks of any size. The events produced do not depend on
/// how the stream is split.
pub struct StreamDecoder {
    parser: V2Parser,
    scanner: HeaderScanner,
    synchronized: bool,
    had_error: bool,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new(fft_size: u32) -> Self {
        Self {
            parser: V2Parser::new(fft_size),
            scanner: HeaderScanner::new(),
            synchronized: false,
            had_error: false,
            stats: DecoderStats::default(),
        }
    }

    pub fn parser(&self) -> &V2Parser {
        &self.parser
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Decode a block of words, appending events to `events`
    pub fn push_words(&mut self, words: &[u32], events: &mut Vec<ParsedEvent>) {
        for &word in words {
            if let Some(event) = self.push_word(word) {
                events.push(event);
            }
        }
    }

    pub fn push_word(&mut self, word: u32) -> Option<ParsedEvent> {
        self.stats.words += 1;

        if !self.synchronized {
            if !self.scanner.accept(word) {
                self.stats.skipped_words += 1;
                return None;
            }
            self.parser.resynchronize();
            self.synchronized = true;
            if self.had_error {
                self.stats.resyncs += 1;
                log::debug!(
                    "resynchronized at header 0x{:08x} after {} skipped words",
                    word,
                    self.stats.skipped_words
                );
            }
        }

        let event = self.parser.parse_word(word)?;
        self.stats.events += 1;
        if let ParsedEvent::DecodeError(e) = &event {
            self.stats.decode_errors += 1;
            log::warn!("decode error: {}, searching for next window header", e);
            self.synchronized = false;
            self.had_error = true;
            self.scanner.restart();
            self.scanner.accept(word);
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeError;

    const FRAME: [u32; 12] = [
        0x0000_0000,
        0x8000_0025,
        0x0000_0000,
        0x000a_0014,
        0x0000_0000,
        0x8000_0026,
        0x0000_0000,
        0x03a4_d93f,
        0x0000_0000,
        0xc000_0027,
        0x0098_9683,
        0x0000_0000,
    ];

    fn expected_frame_events() -> Vec<ParsedEvent> {
        vec![
            ParsedEvent::FftWindowBegin { timestamp: 0x25 },
            ParsedEvent::FftSample {
                bin_index: 0,
                real: 0x000a,
                imag: 0x0014,
            },
            ParsedEvent::FrameEnd,
            ParsedEvent::FftWindowBegin { timestamp: 0x26 },
            ParsedEvent::FftSample {
                bin_index: 0,
                real: 0x03a4,
                imag: 0xd93f_u16 as i16,
            },
            ParsedEvent::FrameEnd,
            ParsedEvent::AverageWindowBegin { timestamp: 0x27 },
            ParsedEvent::AverageSample {
                bin_index: 0,
                magnitude: 0x0098_9683,
            },
            ParsedEvent::FrameEnd,
        ]
    }

    #[test]
    fn test_example_frame() {
        let mut decoder = StreamDecoder::new(1);
        let mut events = Vec::new();
        decoder.push_words(&FRAME, &mut events);
        assert_eq!(events, expected_frame_events());
        let stats = decoder.stats();
        assert_eq!(stats.decode_errors, 0);
        assert_eq!(stats.skipped_words, 1);
        assert_eq!(stats.words, 12);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let mut whole = StreamDecoder::new(1);
        let mut whole_events = Vec::new();
        whole.push_words(&FRAME, &mut whole_events);

        for chunk_size in 1..=FRAME.len() {
            let mut decoder = StreamDecoder::new(1);
            let mut events = Vec::new();
            for chunk in FRAME.chunks(chunk_size) {
                decoder.push_words(chunk, &mut events);
            }
            assert_eq!(events, whole_events, "chunk size {}", chunk_size);
            assert_eq!(decoder.stats(), whole.stats(), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut decoder = StreamDecoder::new(1);
        let mut words = vec![0x8000_0001, 0x0000_0005];
        // Garbage that does not fit an index word, then a good frame
        words.extend_from_slice(&[0x1234_5678, 0x8000_0003, 0x0000_0000]);
        words.extend_from_slice(&FRAME[1..]);

        let mut events = Vec::new();
        decoder.push_words(&words, &mut events);

        assert_eq!(events[0], ParsedEvent::FftWindowBegin { timestamp: 1 });
        assert_eq!(
            events[1],
            ParsedEvent::DecodeError(DecodeError::IndexOutOfRange {
                index: 5,
                fft_size: 1
            })
        );
        assert_eq!(&events[2..], &expected_frame_events()[..]);
        let stats = decoder.stats();
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.resyncs, 1);
        // 0x1234_5678 and 0x8000_0003 (not after a zero) and the zero
        assert_eq!(stats.skipped_words, 3);
    }

    #[test]
    fn test_resync_chunk_boundary_invariance() {
        let mut words = vec![0x8000_0001, 0x0000_0005, 0x1234_5678, 0x8000_0003, 0x0000_0000];
        words.extend_from_slice(&FRAME[1..]);
        // Bad delimiter after an average window, then garbage ending in a zero
        words.extend_from_slice(&[0xc000_0028, 0x0000_0007, 0x8000_0029, 0x0000_0000]);
        words.extend_from_slice(&FRAME[1..]);

        let mut whole = StreamDecoder::new(1);
        let mut whole_events = Vec::new();
        whole.push_words(&words, &mut whole_events);
        assert_eq!(whole.stats().decode_errors, 2);
        assert_eq!(whole.stats().resyncs, 2);

        for chunk_size in 1..=words.len() {
            let mut decoder = StreamDecoder::new(1);
            let mut events = Vec::new();
            for chunk in words.chunks(chunk_size) {
                decoder.push_words(chunk, &mut events);
            }
            assert_eq!(events, whole_events, "chunk size {}", chunk_size);
            assert_eq!(decoder.stats(), whole.stats(), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_erroring_header_is_not_a_resync_point() {
        let mut decoder = StreamDecoder::new(4);
        let mut events = Vec::new();
        // Average window with a bad trailing word, then an FFT header
        decoder.push_words(
            &[0xc000_0001, 1, 2, 3, 4, 0x8000_0009, 0x8000_000a, 0, 0x8000_000b],
            &mut events,
        );
        assert!(events[5].is_error());
        assert_eq!(events[6], ParsedEvent::FftWindowBegin { timestamp: 0xb });
        assert_eq!(events.len(), 7);
    }

    #[test]
    fn test_header_scanner_across_blocks() {
        let mut scanner = HeaderScanner::new();
        scanner.restart();
        assert_eq!(scanner.find_header(&[0x8000_0000, 7, 0]), None);
        assert_eq!(scanner.find_header(&[0x8000_0001]), Some(0));
    }
}
