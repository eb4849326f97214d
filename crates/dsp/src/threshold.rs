// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::ConfigError;

/// Gain, FFT shift and per-bin thresholds produced by the threshold survey tool
///
/// File format, one entry per line, terminated by EOF or an empty line:
///
/// ```text
/// RxGaindB 50
/// SuggestedShift 5
/// 0 4000
/// 1 3900
/// ...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdFile {
    pub gain: i32,
    pub shift_amount: u8,
    pub thresholds: Vec<u32>,
}

impl ThresholdFile {
    pub fn from_path(path: &Path, fft_size: usize) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), fft_size)
    }

    pub fn from_reader<R: BufRead>(reader: R, fft_size: usize) -> Result<Self, ConfigError> {
        let mut gain = None;
        let mut shift_amount = None;
        let mut thresholds: Vec<Option<u32>> = vec![None; fft_size];

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                break;
            }
            let mut fields = line.split_whitespace();
            let key = fields.next().unwrap_or_default();
            let value: f32 = fields
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| ConfigError::ThresholdFile(format!("bad line '{}'", line)))?;

            if let Ok(bin) = key.parse::<usize>() {
                let slot = thresholds.get_mut(bin).ok_or_else(|| {
                    ConfigError::ThresholdFile(format!("bin number {} too large", bin))
                })?;
                if slot.is_some() {
                    return Err(ConfigError::ThresholdFile(format!(
                        "duplicate bin number {}",
                        bin
                    )));
                }
                *slot = Some(value as u32);
            } else {
                match key {
                    "RxGaindB" => gain = Some(value as i32),
                    "SuggestedShift" => shift_amount = Some(value as u8),
                    other => log::debug!("ignoring threshold file key {}", other),
                }
            }
        }

        let incomplete = || ConfigError::ThresholdFile("incomplete file".to_string());
        let thresholds = thresholds
            .into_iter()
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(incomplete)?;
        Ok(Self {
            gain: gain.ok_or_else(incomplete)?,
            shift_amount: shift_amount.ok_or_else(incomplete)?,
            thresholds,
        })
    }
}
