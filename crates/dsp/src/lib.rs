// Copyright 2025-2026 CEMAXECUTER LLC

//! Capture geometry for SparSDR compression: which FFT bins a requested
//! band occupies, how those bins are written into the device's bin
//! specification, and the window/threshold tables loaded alongside it.

pub mod bins;
pub mod mask;
pub mod setup;
pub mod threshold;
pub mod window;

use serde::{Deserialize, Serialize};

pub use bins::{BinRange, FreqRange};
pub use mask::{BinSpec, BinSpecEntry};
pub use setup::{ReceiverConfig, ReceiverSetup, ReconstructBand};
pub use threshold::ThresholdFile;

/// Configuration errors: bad capture geometry, bin specifications and threshold files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FFT size {0} is not a power of two")]
    FftSizeNotPowerOfTwo(u32),

    #[error("filter bandwidth {filter_bw} Hz exceeds capture bandwidth {capture_bw} Hz")]
    FilterTooWide { filter_bw: f32, capture_bw: f32 },

    #[error("capture bandwidth must be positive, got {0} Hz")]
    InvalidBandwidth(f32),

    #[error("band {index} (center {center} Hz, bandwidth {bandwidth} Hz) is outside the filter passband")]
    BandOutOfRange {
        index: usize,
        center: f32,
        bandwidth: f32,
    },

    #[error("invalid bin specification '{spec}': {reason}")]
    BinSpec { spec: String, reason: String },

    #[error("threshold file: {0}")]
    ThresholdFile(String),

    #[error("config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters of one compressed capture session
///
/// Frequencies are in hertz. `capture_bw` is the sample rate and therefore
/// also the bandwidth spanned by the compression FFT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureParameters {
    pub center_freq: f32,
    pub capture_bw: f32,
    pub filter_bw: f32,
    pub fft_size: u32,
}

impl CaptureParameters {
    pub fn new(
        center_freq: f32,
        capture_bw: f32,
        filter_bw: f32,
        fft_size: u32,
    ) -> Result<Self, ConfigError> {
        let params = Self {
            center_freq,
            capture_bw,
            filter_bw,
            fft_size,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the invariants that `new` enforces. Needed after deserializing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 2 {
            return Err(ConfigError::FftSizeNotPowerOfTwo(self.fft_size));
        }
        if !(self.capture_bw > 0.0) {
            return Err(ConfigError::InvalidBandwidth(self.capture_bw));
        }
        if self.filter_bw > self.capture_bw || !(self.filter_bw > 0.0) {
            return Err(ConfigError::FilterTooWide {
                filter_bw: self.filter_bw,
                capture_bw: self.capture_bw,
            });
        }
        Ok(())
    }

    /// Width of one FFT bin in hertz
    pub fn bin_width(&self) -> f32 {
        self.capture_bw / self.fft_size as f32
    }

    /// Run the bin calculator for one band
    pub fn bins_for(&self, band: &BandSpec) -> BinRange {
        let (center, bandwidth) = band.resolve(self);
        bins::bins_calc_hertz(
            self.center_freq,
            self.capture_bw,
            center,
            bandwidth,
            self.filter_bw,
            self.fft_size,
        )
    }
}

/// How a band's center frequency is expressed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandCenter {
    Absolute(f32),
    /// Offset from the capture center frequency
    Relative(f32),
}

/// How a band's width is expressed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandWidth {
    Hertz(f32),
    Bins(u32),
}

/// A frequency region the user wants reconstructed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub center: BandCenter,
    pub width: BandWidth,
}

impl BandSpec {
    pub fn absolute(center_freq: f32, bandwidth: f32) -> Self {
        Self {
            center: BandCenter::Absolute(center_freq),
            width: BandWidth::Hertz(bandwidth),
        }
    }

    pub fn relative_bins(offset: f32, bins: u32) -> Self {
        Self {
            center: BandCenter::Relative(offset),
            width: BandWidth::Bins(bins),
        }
    }

    /// Absolute center frequency and bandwidth in hertz for a capture
    pub fn resolve(&self, capture: &CaptureParameters) -> (f32, f32) {
        let center = match self.center {
            BandCenter::Absolute(f) => f,
            BandCenter::Relative(offset) => capture.center_freq + offset,
        };
        let bandwidth = match self.width {
            BandWidth::Hertz(bw) => bw,
            BandWidth::Bins(bins) => bins as f32 * capture.bin_width(),
        };
        (center, bandwidth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_parameters_validation() {
        assert!(CaptureParameters::new(2.45e9, 100e6, 100e6, 2048).is_ok());
        assert!(matches!(
            CaptureParameters::new(2.45e9, 100e6, 100e6, 1000),
            Err(ConfigError::FftSizeNotPowerOfTwo(1000))
        ));
        assert!(matches!(
            CaptureParameters::new(2.45e9, 100e6, 120e6, 2048),
            Err(ConfigError::FilterTooWide { .. })
        ));
    }

    #[test]
    fn test_band_resolve() {
        let capture = CaptureParameters::new(2.45e9, 100e6, 100e6, 2048).unwrap();
        let (center, bw) = BandSpec::relative_bins(1e6, 64).resolve(&capture);
        assert_eq!(center, 2.45e9 + 1e6);
        assert_eq!(bw, 64.0 * 48828.125);

        let (center, bw) = BandSpec::absolute(2.44e9, 2e6).resolve(&capture);
        assert_eq!(center, 2.44e9);
        assert_eq!(bw, 2e6);
    }

    #[test]
    fn test_band_spec_json() {
        let json = r#"{"center":{"relative":-5000000.0},"width":{"hertz":2000000.0}}"#;
        let band: BandSpec = serde_json::from_str(json).unwrap();
        assert_eq!(band.center, BandCenter::Relative(-5e6));
        assert_eq!(band.width, BandWidth::Hertz(2e6));
    }
}
