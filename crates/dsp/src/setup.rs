// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bins::BinRange;
use crate::mask::BinSpec;
use crate::window::rounded_hann_window;
use crate::{BandSpec, CaptureParameters, ConfigError};

/// Everything needed to configure a compressing receiver for a set of bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub capture: CaptureParameters,
    /// Threshold applied to every unmasked bin
    pub threshold: u32,
    pub bands: Vec<BandSpec>,
}

impl ReceiverConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: ReceiverConfig = serde_json::from_str(&text)?;
        config.capture.validate()?;
        Ok(config)
    }
}

/// A band handed to the reconstruction engine
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructBand {
    /// Absolute center frequency in hertz
    pub center_freq: f32,
    /// Number of unmasked bins the band occupies
    pub bins: u32,
    pub range: BinRange,
}

/// Device configuration derived from a `ReceiverConfig`
#[derive(Debug, Clone)]
pub struct ReceiverSetup {
    pub bin_spec: BinSpec,
    pub bands: Vec<ReconstructBand>,
    /// FFT window for the configured size
    pub window: Vec<u16>,
}

impl ReceiverSetup {
    /// Map every band to bins and build the combined bin specification.
    ///
    /// Fails if any band cannot be reached with the capture's filter.
    pub fn new(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        let capture = &config.capture;
        capture.validate()?;

        let mut bin_spec = BinSpec::new();
        let mut bands = Vec::with_capacity(config.bands.len());

        for (index, band) in config.bands.iter().enumerate() {
            let (center, bandwidth) = band.resolve(capture);
            let range = capture.bins_for(band);
            if range.status() == 0 {
                log::error!(
                    "band {} (center {} Hz, bandwidth {} Hz): can't determine bins to unmask",
                    index,
                    center,
                    bandwidth
                );
                return Err(ConfigError::BandOutOfRange {
                    index,
                    center,
                    bandwidth,
                });
            }
            for bins in range.ranges() {
                log::info!(
                    "band {} (center {} Hz, bandwidth {} Hz): unmasking bins {}..{}",
                    index,
                    center,
                    bandwidth,
                    bins.start,
                    bins.end
                );
                bin_spec.push(bins, config.threshold);
            }
            bands.push(ReconstructBand {
                center_freq: center,
                bins: range.bin_count(),
                range,
            });
        }

        log::info!("generated bin specification: {}", bin_spec);
        Ok(Self {
            bin_spec,
            bands,
            window: rounded_hann_window(capture.fft_size as usize),
        })
    }
}
