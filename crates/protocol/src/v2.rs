// Copyright 2025-2026 CEMAXECUTER LLC

use crate::{
    DecodeError, ParsedEvent, ParserState, AVERAGE_BIT, HEADER_BIT, INDEX_MASK, SEQUENCE_MASK,
    TIMESTAMP_MASK,
};

/// Word-at-a-time parser for the V2 compressed format
///
/// The parser never skips input on its own. After it returns a
/// `DecodeError` event the caller must find the next window header and call
/// [`V2Parser::resynchronize`] before feeding words from there.
#[derive(Debug, Clone)]
pub struct V2Parser {
    fft_size: u32,
    state: ParserState,
    /// Bin of the next sample in the current run
    index: u32,
    last_timestamp: Option<u32>,
    last_sequence: Option<u16>,
}

impl V2Parser {
    pub fn new(fft_size: u32) -> Self {
        Self {
            fft_size,
            state: ParserState::AwaitWindowHeader,
            index: 0,
            last_timestamp: None,
            last_sequence: None,
        }
    }

    pub fn fft_size(&self) -> u32 {
        self.fft_size
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Timestamp of the most recent window header
    pub fn last_timestamp(&self) -> Option<u32> {
        self.last_timestamp
    }

    /// Sequence number of the most recent index word
    pub fn last_sequence(&self) -> Option<u16> {
        self.last_sequence
    }

    /// Restart at a window header
    pub fn resynchronize(&mut self) {
        self.state = ParserState::AwaitWindowHeader;
        self.index = 0;
    }

    /// Consume one word. Returns the event it produced, if any.
    pub fn parse_word(&mut self, word: u32) -> Option<ParsedEvent> {
        let result = match self.state {
            ParserState::AwaitWindowHeader => {
                if word & HEADER_BIT != 0 {
                    Ok(self.window_header(word))
                } else {
                    Err(DecodeError::MissingWindowHeader { word })
                }
            }
            ParserState::AwaitEitherHeader => {
                if word & HEADER_BIT != 0 {
                    Ok(self.window_header(word))
                } else {
                    self.index_word(word, true).map(|_| None)
                }
            }
            ParserState::AwaitIndexHeader => self.index_word(word, false).map(|_| None),
            ParserState::InFftRun => self.fft_word(word),
            ParserState::InAverageRun => self.average_word(word),
        };

        match result {
            Ok(event) => {
                if let Some(event) = &event {
                    log::trace!("0x{:08x} -> {:?}", word, event);
                }
                event
            }
            Err(e) => {
                log::debug!("decode error in state {:?}: {}", self.state, e);
                Some(ParsedEvent::DecodeError(e))
            }
        }
    }

    fn window_header(&mut self, word: u32) -> Option<ParsedEvent> {
        let timestamp = word & TIMESTAMP_MASK;
        self.last_timestamp = Some(timestamp);
        if word & AVERAGE_BIT != 0 {
            self.state = ParserState::InAverageRun;
            self.index = 0;
            Some(ParsedEvent::AverageWindowBegin { timestamp })
        } else {
            self.state = ParserState::AwaitIndexHeader;
            Some(ParsedEvent::FftWindowBegin { timestamp })
        }
    }

    fn index_word(&mut self, word: u32, after_run: bool) -> Result<(), DecodeError> {
        let index = word & INDEX_MASK;
        self.last_sequence = Some(((word >> 16) & SEQUENCE_MASK) as u16);

        if index >= self.fft_size {
            return Err(DecodeError::IndexOutOfRange {
                index,
                fft_size: self.fft_size,
            });
        }
        if after_run && index <= self.index {
            return Err(DecodeError::IndexNotIncreasing {
                index,
                previous: self.index,
            });
        }
        self.index = index;
        self.state = ParserState::InFftRun;
        Ok(())
    }

    fn fft_word(&mut self, word: u32) -> Result<Option<ParsedEvent>, DecodeError> {
        if word == 0 {
            self.state = ParserState::AwaitEitherHeader;
            return Ok(Some(ParsedEvent::FrameEnd));
        }
        if self.index >= self.fft_size {
            return Err(DecodeError::FftRunOverflow {
                fft_size: self.fft_size,
            });
        }
        let event = ParsedEvent::FftSample {
            bin_index: self.index,
            real: (word >> 16) as u16 as i16,
            imag: word as u16 as i16,
        };
        self.index += 1;
        Ok(Some(event))
    }

    fn average_word(&mut self, word: u32) -> Result<Option<ParsedEvent>, DecodeError> {
        if self.index < self.fft_size {
            let event = ParsedEvent::AverageSample {
                bin_index: self.index,
                magnitude: word,
            };
            self.index += 1;
            Ok(Some(event))
        } else if word == 0 {
            self.state = ParserState::AwaitWindowHeader;
            Ok(Some(ParsedEvent::FrameEnd))
        } else {
            Err(DecodeError::MissingAverageDelimiter { word })
        }
    }
}
