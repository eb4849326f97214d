// Copyright 2025-2026 CEMAXECUTER LLC

use num_complex::Complex;

use crate::ParsedEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum WindowKind {
    /// FFT output, zero in bins the radio did not send
    Data(Vec<Complex<i16>>),
    /// Per-bin average magnitudes
    Average(Vec<u32>),
}

/// One complete window from the compressed stream
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub timestamp: u32,
    pub kind: WindowKind,
}

impl Window {
    fn data(timestamp: u32, fft_size: usize) -> Self {
        Self {
            timestamp,
            kind: WindowKind::Data(vec![Complex::new(0, 0); fft_size]),
        }
    }

    fn average(timestamp: u32, fft_size: usize) -> Self {
        Self {
            timestamp,
            kind: WindowKind::Average(vec![0; fft_size]),
        }
    }

    pub fn is_average(&self) -> bool {
        matches!(self.kind, WindowKind::Average(_))
    }

    /// Number of bins with a non-zero value
    pub fn active_bins(&self) -> usize {
        match &self.kind {
            WindowKind::Data(bins) => bins.iter().filter(|c| c.re != 0 || c.im != 0).count(),
            WindowKind::Average(bins) => bins.iter().filter(|&&m| m != 0).count(),
        }
    }
}

/// Collects parser events into windows.
///
/// An FFT window is only known to be complete when the next window header
/// arrives, since any number of runs may follow its header. Call
/// [`WindowAssembler::finish`] at the end of the stream to get the last one.
pub struct WindowAssembler {
    fft_size: usize,
    current: Option<Window>,
    discarded: u64,
}

impl WindowAssembler {
    pub fn new(fft_size: usize) -> Self {
        Self {
            fft_size,
            current: None,
            discarded: 0,
        }
    }

    /// Partial windows dropped because of decode errors
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn push(&mut self, event: &ParsedEvent) -> Option<Window> {
        match *event {
            ParsedEvent::FftWindowBegin { timestamp } => {
                self.current.replace(Window::data(timestamp, self.fft_size))
            }
            ParsedEvent::AverageWindowBegin { timestamp } => {
                self.current.replace(Window::average(timestamp, self.fft_size))
            }
            ParsedEvent::FftSample {
                bin_index,
                real,
                imag,
            } => {
                if let Some(Window {
                    kind: WindowKind::Data(bins),
                    ..
                }) = &mut self.current
                {
                    if let Some(bin) = bins.get_mut(bin_index as usize) {
                        *bin = Complex::new(real, imag);
                    }
                }
                None
            }
            ParsedEvent::AverageSample {
                bin_index,
                magnitude,
            } => {
                if let Some(Window {
                    kind: WindowKind::Average(bins),
                    ..
                }) = &mut self.current
                {
                    if let Some(bin) = bins.get_mut(bin_index as usize) {
                        *bin = magnitude;
                    }
                }
                None
            }
            ParsedEvent::FrameEnd => {
                // An average window has exactly one run
                if self.current.as_ref().map_or(false, Window::is_average) {
                    self.current.take()
                } else {
                    None
                }
            }
            ParsedEvent::DecodeError(_) => {
                if self.current.take().is_some() {
                    self.discarded += 1;
                }
                None
            }
        }
    }

    /// Flush the window in progress at the end of the stream
    pub fn finish(&mut self) -> Option<Window> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecodeError, StreamDecoder};

    #[test]
    fn test_assemble_windows() {
        let mut decoder = StreamDecoder::new(4);
        let mut events = Vec::new();
        decoder.push_words(
            &[
                0x8000_0010, 0, 0x0001_0002, 0, 2, 0x0003_0004, 0x0005_0006, 0,
                0xc000_0011, 9, 8, 7, 6, 0,
            ],
            &mut events,
        );

        let mut assembler = WindowAssembler::new(4);
        let windows: Vec<Window> = events.iter().filter_map(|e| assembler.push(e)).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].timestamp, 0x10);
        assert_eq!(
            windows[0].kind,
            WindowKind::Data(vec![
                Complex::new(1, 2),
                Complex::new(0, 0),
                Complex::new(3, 4),
                Complex::new(5, 6),
            ])
        );
        assert_eq!(windows[1].kind, WindowKind::Average(vec![9, 8, 7, 6]));
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_finish_flushes_last_data_window() {
        let mut assembler = WindowAssembler::new(2);
        assembler.push(&ParsedEvent::FftWindowBegin { timestamp: 3 });
        assembler.push(&ParsedEvent::FftSample {
            bin_index: 1,
            real: -1,
            imag: 1,
        });
        assert_eq!(assembler.push(&ParsedEvent::FrameEnd), None);
        let window = assembler.finish().unwrap();
        assert_eq!(window.active_bins(), 1);
    }

    #[test]
    fn test_decode_error_discards_partial_window() {
        let mut assembler = WindowAssembler::new(2);
        assembler.push(&ParsedEvent::AverageWindowBegin { timestamp: 1 });
        assembler.push(&ParsedEvent::AverageSample {
            bin_index: 0,
            magnitude: 5,
        });
        assembler.push(&ParsedEvent::DecodeError(DecodeError::MissingWindowHeader {
            word: 1,
        }));
        assert_eq!(assembler.discarded(), 1);
        assert!(assembler.finish().is_none());
    }
}
