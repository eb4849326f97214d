// Copyright 2025-2026 CEMAXECUTER LLC

use std::ops::Range;

/// Decimal digits kept when rounding fractional bin positions (in MHz units)
const RND_DIGITS: i32 = 4;
/// Bins added on each side of the requested band before flooring/ceiling
const GUARD_BINS: f64 = 2.0;

const HERTZ_PER_MEGAHERTZ: f32 = 1e6;

/// Frequency interval actually covered by a set of bins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreqRange {
    pub start: f32,
    pub end: f32,
}

impl FreqRange {
    pub fn width(&self) -> f32 {
        self.end - self.start
    }

    fn scaled(self, factor: f32) -> Self {
        Self {
            start: self.start * factor,
            end: self.end * factor,
        }
    }
}

/// Result of mapping a band onto the compression FFT
///
/// Bin numbers use the device's DC-centered order and every range is half-open.
#[derive(Debug, Clone, PartialEq)]
pub enum BinRange {
    /// Some part of the band lies outside the analog filter passband
    OutOfRange,
    /// One run of bins
    Contiguous { bins: Range<u32>, freq: FreqRange },
    /// The band straddles the DC/Nyquist boundary of the device order: `low`
    /// starts at bin 0 and `high` ends at the FFT size
    Split {
        low: Range<u32>,
        high: Range<u32>,
        freq: FreqRange,
    },
}

impl BinRange {
    /// 0 when unreachable, otherwise the number of bin ranges
    pub fn status(&self) -> u8 {
        match self {
            BinRange::OutOfRange => 0,
            BinRange::Contiguous { .. } => 1,
            BinRange::Split { .. } => 2,
        }
    }

    pub fn ranges(&self) -> Vec<Range<u32>> {
        match self {
            BinRange::OutOfRange => Vec::new(),
            BinRange::Contiguous { bins, .. } => vec![bins.clone()],
            BinRange::Split { low, high, .. } => vec![low.clone(), high.clone()],
        }
    }

    pub fn bin_count(&self) -> u32 {
        self.ranges().iter().map(|r| r.end - r.start).sum()
    }

    pub fn freq(&self) -> Option<FreqRange> {
        match self {
            BinRange::OutOfRange => None,
            BinRange::Contiguous { freq, .. } | BinRange::Split { freq, .. } => Some(*freq),
        }
    }

    fn scale_freq(self, factor: f32) -> Self {
        match self {
            BinRange::OutOfRange => BinRange::OutOfRange,
            BinRange::Contiguous { bins, freq } => BinRange::Contiguous {
                bins,
                freq: freq.scaled(factor),
            },
            BinRange::Split { low, high, freq } => BinRange::Split {
                low,
                high,
                freq: freq.scaled(factor),
            },
        }
    }
}

/// Round to RND_DIGITS decimals the way the FPGA tooling does: single
/// precision in, double precision scale and round-half-away-from-zero.
fn round_float(val: f32) -> f32 {
    let scale = 10f64.powi(RND_DIGITS);
    ((val as f64 * scale).round() / scale) as f32
}

/// Calculate the bin range(s) to unmask for a band, all frequencies in MHz.
///
/// - `capture_center_freq`: center of the capture
/// - `capture_bw`: capture sample rate (equal to the FFT bandwidth)
/// - `band_center_freq`, `band_bandwidth`: the band to recover (absolute)
/// - `filter_bw`: effective analog bandwidth, at most `capture_bw`
/// - `fft_size`: compression FFT size, a power of two
///
/// The arithmetic is single precision with 4-digit rounding in MHz units so
/// that the result matches the bins the FPGA tooling computes. The band is
/// widened by two guard bins per side and the bin count is made even.
pub fn bins_calc(
    capture_center_freq: f32,
    capture_bw: f32,
    band_center_freq: f32,
    band_bandwidth: f32,
    filter_bw: f32,
    fft_size: u32,
) -> BinRange {
    let bin_width = capture_bw / fft_size as f32;
    let capture_left = capture_center_freq - capture_bw / 2.0;
    let filter_left = capture_center_freq - filter_bw / 2.0;
    let filter_right = capture_center_freq + filter_bw / 2.0;
    let band_left = band_center_freq - band_bandwidth / 2.0;
    let band_right = band_center_freq + band_bandwidth / 2.0;

    if band_left < filter_left || band_right > filter_right {
        return BinRange::OutOfRange;
    }

    let left_bin_float = (round_float((band_left - capture_left) / bin_width) as f64 - GUARD_BINS) as f32;
    let right_bin_float = (round_float((band_right - capture_left) / bin_width) as f64 + GUARD_BINS) as f32;

    let last_bin = fft_size as i64 - 1;
    let half_fft = fft_size as i64 / 2;

    // An exact integer right edge belongs to the next bin
    let mut left_bin = (left_bin_float as f64).floor() as i64;
    let mut right_bin = if right_bin_float.ceil() == right_bin_float.floor() {
        right_bin_float.floor() as i64 - 1
    } else {
        right_bin_float.floor() as i64
    };
    // The guard bins can run past the FFT edges when the filter spans the whole capture
    left_bin = left_bin.max(0);
    right_bin = right_bin.min(last_bin);

    let l_adj = round_float(band_left - (capture_left + left_bin as f32 * bin_width));
    let r_adj = round_float((capture_left + (right_bin + 1) as f32 * bin_width) - band_right);

    // Overlap-add needs an even number of bins. Never move an edge across
    // the FFT boundary or the middle of the natural order.
    if (right_bin - left_bin + 1) % 2 != 0 {
        if left_bin == 0 || left_bin == half_fft {
            right_bin += 1;
        } else if right_bin == last_bin || right_bin == half_fft - 1 {
            left_bin -= 1;
        } else if r_adj > l_adj {
            right_bin -= 1;
        } else {
            right_bin += 1;
        }
    }

    let freq = FreqRange {
        start: round_float(capture_left + left_bin as f32 * bin_width),
        end: round_float(capture_left + (right_bin + 1) as f32 * bin_width),
    };

    // Device bin order puts the capture center at bin 0
    let half = fft_size / 2;
    let left = left_bin as u32 ^ half;
    let right = right_bin as u32 ^ half;

    log::debug!(
        "band {}..{} MHz: natural bins {}..={}, device bins {} and {}",
        band_left,
        band_right,
        left_bin,
        right_bin,
        left,
        right
    );

    if (left < half && right < half) || (left >= half && right >= half) {
        BinRange::Contiguous {
            bins: left..right + 1,
            freq,
        }
    } else if left == half && right == half - 1 {
        BinRange::Contiguous {
            bins: 0..fft_size,
            freq,
        }
    } else {
        BinRange::Split {
            low: 0..right + 1,
            high: left..fft_size,
            freq,
        }
    }
}

/// `bins_calc` with every frequency in hertz.
///
/// Values are converted to MHz for the calculation and the recovered
/// frequency range is converted back.
pub fn bins_calc_hertz(
    capture_center_freq: f32,
    capture_bw: f32,
    band_center_freq: f32,
    band_bandwidth: f32,
    filter_bw: f32,
    fft_size: u32,
) -> BinRange {
    bins_calc(
        capture_center_freq / HERTZ_PER_MEGAHERTZ,
        capture_bw / HERTZ_PER_MEGAHERTZ,
        band_center_freq / HERTZ_PER_MEGAHERTZ,
        band_bandwidth / HERTZ_PER_MEGAHERTZ,
        filter_bw / HERTZ_PER_MEGAHERTZ,
        fft_size,
    )
    .scale_freq(HERTZ_PER_MEGAHERTZ)
}
