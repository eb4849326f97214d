// Copyright 2025-2026 CEMAXECUTER LLC

//! Legacy V1 format: every sample is an 8-byte record carrying its own bin
//! index and a truncated timestamp. Windows are formed from runs of samples
//! with the same timestamp and kind.

use byteorder::{ByteOrder, LittleEndian};
use num_complex::Complex;

use crate::window::{Window, WindowKind};

/// Bytes per V1 sample
pub const V1_SAMPLE_BYTES: usize = 8;

/// Field placement differs between the radios that produce V1 captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V1Layout {
    /// USRP N210: 11-bit index, 20-bit time
    N210,
    /// Pluto: 10-bit index, 21-bit time, halfwords in reverse order
    Pluto,
}

impl V1Layout {
    /// Largest FFT the index field can address
    pub fn max_fft_size(self) -> usize {
        match self {
            V1Layout::N210 => 2048,
            V1Layout::Pluto => 1024,
        }
    }

    /// Decode one 8-byte record
    pub fn unpack(self, bytes: &[u8; V1_SAMPLE_BYTES]) -> V1Sample {
        type E = LittleEndian;
        // Offsets of (fft_index, time, more significant half, less significant half)
        let (index_at, time_at, high_at, low_at) = match self {
            V1Layout::N210 => (0, 2, 4, 6),
            V1Layout::Pluto => (6, 4, 2, 0),
        };
        let fft_index = E::read_u16(&bytes[index_at..index_at + 2]);
        let time = u32::from(E::read_u16(&bytes[time_at..time_at + 2]));
        let high = E::read_u16(&bytes[high_at..high_at + 2]);
        let low = E::read_u16(&bytes[low_at..low_at + 2]);

        let (index, time) = match self {
            V1Layout::N210 => ((fft_index >> 4) & 0x7ff, time | u32::from(fft_index & 0xf) << 16),
            V1Layout::Pluto => ((fft_index >> 5) & 0x3ff, time | u32::from(fft_index & 0x1f) << 16),
        };

        if (fft_index >> 15) & 1 == 1 {
            V1Sample::Average {
                time,
                index,
                magnitude: u32::from(high) << 16 | u32::from(low),
            }
        } else {
            V1Sample::Data {
                time,
                index,
                real: high as i16,
                imag: low as i16,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V1Sample {
    Data {
        time: u32,
        index: u16,
        real: i16,
        imag: i16,
    },
    Average {
        time: u32,
        index: u16,
        magnitude: u32,
    },
}

impl V1Sample {
    pub fn time(&self) -> u32 {
        match *self {
            V1Sample::Data { time, .. } | V1Sample::Average { time, .. } => time,
        }
    }

    pub fn index(&self) -> u16 {
        match *self {
            V1Sample::Data { index, .. } | V1Sample::Average { index, .. } => index,
        }
    }

    fn is_average(&self) -> bool {
        matches!(self, V1Sample::Average { .. })
    }
}

/// Groups V1 samples into windows
///
/// A window ends when a sample arrives with a different time or of the
/// other kind. Samples with an index beyond the FFT size are dropped.
pub struct V1Assembler {
    layout: V1Layout,
    fft_size: usize,
    current: Option<Window>,
    carry: Vec<u8>,
    dropped: u64,
}

impl V1Assembler {
    pub fn new(layout: V1Layout, fft_size: usize) -> Self {
        Self {
            layout,
            fft_size,
            current: None,
            carry: Vec::with_capacity(V1_SAMPLE_BYTES),
            dropped: 0,
        }
    }

    /// Samples ignored because their bin index did not fit the FFT
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Consume raw bytes, appending completed windows to `windows`
    pub fn push_bytes(&mut self, bytes: &[u8], windows: &mut Vec<Window>) {
        let mut rest = bytes;
        if !self.carry.is_empty() {
            let need = (V1_SAMPLE_BYTES - self.carry.len()).min(rest.len());
            self.carry.extend_from_slice(&rest[..need]);
            rest = &rest[need..];
            if self.carry.len() < V1_SAMPLE_BYTES {
                return;
            }
            let mut record = [0u8; V1_SAMPLE_BYTES];
            record.copy_from_slice(&self.carry);
            self.carry.clear();
            windows.extend(self.push_sample(self.layout.unpack(&record)));
        }

        let mut chunks = rest.chunks_exact(V1_SAMPLE_BYTES);
        for chunk in chunks.by_ref() {
            let mut record = [0u8; V1_SAMPLE_BYTES];
            record.copy_from_slice(chunk);
            windows.extend(self.push_sample(self.layout.unpack(&record)));
        }
        self.carry.extend_from_slice(chunks.remainder());
    }

    pub fn push_sample(&mut self, sample: V1Sample) -> Option<Window> {
        let index = usize::from(sample.index());
        if index >= self.fft_size {
            self.dropped += 1;
            log::debug!("dropping V1 sample with index {} (FFT size {})", index, self.fft_size);
            return None;
        }

        let continues = self.current.as_ref().map_or(false, |w| {
            w.timestamp == sample.time() && w.is_average() == sample.is_average()
        });
        let finished = if continues {
            None
        } else {
            let kind = if sample.is_average() {
                WindowKind::Average(vec![0; self.fft_size])
            } else {
                WindowKind::Data(vec![Complex::new(0, 0); self.fft_size])
            };
            self.current.replace(Window {
                timestamp: sample.time(),
                kind,
            })
        };

        if let Some(window) = &mut self.current {
            match (&mut window.kind, sample) {
                (WindowKind::Data(bins), V1Sample::Data { real, imag, .. }) => {
                    bins[index] = Complex::new(real, imag);
                }
                (WindowKind::Average(bins), V1Sample::Average { magnitude, .. }) => {
                    bins[index] = magnitude;
                }
                _ => {}
            }
        }
        finished
    }

    pub fn finish(&mut self) -> Option<Window> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n210_record(average: bool, index: u16, time: u32, high: u16, low: u16) -> [u8; 8] {
        let fft_index = (u16::from(average) << 15) | (index << 4) | ((time >> 16) as u16 & 0xf);
        let mut record = [0u8; 8];
        LittleEndian::write_u16(&mut record[0..2], fft_index);
        LittleEndian::write_u16(&mut record[2..4], time as u16);
        LittleEndian::write_u16(&mut record[4..6], high);
        LittleEndian::write_u16(&mut record[6..8], low);
        record
    }

    #[test]
    fn test_unpack_n210() {
        let record = n210_record(false, 1500, 0xa_1234, 0xfffe, 0x0003);
        assert_eq!(
            V1Layout::N210.unpack(&record),
            V1Sample::Data {
                time: 0xa_1234,
                index: 1500,
                real: -2,
                imag: 3
            }
        );

        let record = n210_record(true, 7, 5, 0x0001, 0x0002);
        assert_eq!(
            V1Layout::N210.unpack(&record),
            V1Sample::Average {
                time: 5,
                index: 7,
                magnitude: 0x0001_0002
            }
        );
    }

    #[test]
    fn test_unpack_pluto() {
        let fft_index: u16 = (1 << 15) | (1000 << 5) | 0x1f;
        let mut record = [0u8; 8];
        LittleEndian::write_u16(&mut record[0..2], 0x5678);
        LittleEndian::write_u16(&mut record[2..4], 0x1234);
        LittleEndian::write_u16(&mut record[4..6], 0xbeef);
        LittleEndian::write_u16(&mut record[6..8], fft_index);
        assert_eq!(
            V1Layout::Pluto.unpack(&record),
            V1Sample::Average {
                time: 0x1f_beef,
                index: 1000,
                magnitude: 0x1234_5678
            }
        );
    }

    #[test]
    fn test_assembler_groups_by_time_and_kind() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&n210_record(false, 1, 10, 1, 1));
        bytes.extend_from_slice(&n210_record(false, 2, 10, 2, 2));
        bytes.extend_from_slice(&n210_record(true, 0, 10, 0, 9));
        bytes.extend_from_slice(&n210_record(false, 0, 11, 3, 3));

        let mut assembler = V1Assembler::new(V1Layout::N210, 4);
        let mut windows = Vec::new();
        // Split mid-record to exercise the carry
        assembler.push_bytes(&bytes[..13], &mut windows);
        assembler.push_bytes(&bytes[13..], &mut windows);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].timestamp, 10);
        assert_eq!(windows[0].active_bins(), 2);
        assert_eq!(windows[1].kind, WindowKind::Average(vec![9, 0, 0, 0]));
        let last = assembler.finish().unwrap();
        assert_eq!(last.timestamp, 11);
    }

    #[test]
    fn test_assembler_drops_large_index() {
        let mut assembler = V1Assembler::new(V1Layout::N210, 4);
        let mut windows = Vec::new();
        assembler.push_bytes(&n210_record(false, 100, 0, 1, 1), &mut windows);
        assert_eq!(assembler.dropped(), 1);
        assert!(assembler.finish().is_none());
    }
}
