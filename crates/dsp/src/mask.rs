// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::ConfigError;

/// One `start..end:threshold` (or `bin:threshold`) entry of a bin specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinSpecEntry {
    /// Half-open range of device bins
    pub bins: Range<u32>,
    pub threshold: u32,
}

impl fmt::Display for BinSpecEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bins.end == self.bins.start + 1 {
            write!(f, "{}:{}", self.bins.start, self.threshold)
        } else {
            write!(f, "{}..{}:{}", self.bins.start, self.bins.end, self.threshold)
        }
    }
}

/// Textual bin mask/threshold configuration for the compressing radio
///
/// Format: comma-separated `start..end:threshold` or `bin:threshold` entries.
/// Any bin not listed is masked. An empty specification masks every bin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinSpec {
    entries: Vec<BinSpecEntry>,
}

impl BinSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[BinSpecEntry] {
        &self.entries
    }

    pub fn push(&mut self, bins: Range<u32>, threshold: u32) {
        self.entries.push(BinSpecEntry { bins, threshold });
    }

    /// Parse a specification and check every entry against the FFT size
    pub fn parse(spec: &str, fft_size: u32) -> Result<Self, ConfigError> {
        let parsed: BinSpec = spec.parse()?;
        parsed.check(fft_size)?;
        Ok(parsed)
    }

    /// Verify that every entry lies inside an FFT of `fft_size` bins
    pub fn check(&self, fft_size: u32) -> Result<(), ConfigError> {
        for entry in &self.entries {
            if entry.bins.start >= fft_size || entry.bins.end > fft_size {
                return Err(spec_error(
                    &entry.to_string(),
                    format!("bin number too large for FFT size {}", fft_size),
                ));
            }
        }
        Ok(())
    }

    /// Per-bin thresholds, `None` for masked bins. Later entries win.
    pub fn to_mask(&self, fft_size: u32) -> Result<Vec<Option<u32>>, ConfigError> {
        self.check(fft_size)?;
        let mut mask = vec![None; fft_size as usize];
        for entry in &self.entries {
            for bin in entry.bins.clone() {
                mask[bin as usize] = Some(entry.threshold);
            }
        }
        Ok(mask)
    }

    /// Number of unmasked bins, counting overlapping entries once
    pub fn unmasked_count(&self, fft_size: u32) -> Result<usize, ConfigError> {
        Ok(self.to_mask(fft_size)?.iter().filter(|b| b.is_some()).count())
    }
}

fn spec_error(spec: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::BinSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T: FromStr>(text: &str, part: &str) -> Result<T, ConfigError> {
    text.trim()
        .parse()
        .map_err(|_| spec_error(part, format!("'{}' is not a valid number", text)))
}

impl FromStr for BinSpecEntry {
    type Err = ConfigError;

    fn from_str(part: &str) -> Result<Self, Self::Err> {
        let (bins, threshold) = part
            .split_once(':')
            .ok_or_else(|| spec_error(part, "no ':' in range specification"))?;

        let bins = match bins.split_once("..") {
            Some((start, end)) => parse_number::<u32>(start, part)?..parse_number(end, part)?,
            None => {
                let bin: u32 = parse_number(bins, part)?;
                let end = bin
                    .checked_add(1)
                    .ok_or_else(|| spec_error(part, "bin number too large"))?;
                bin..end
            }
        };
        if bins.start >= bins.end {
            return Err(spec_error(part, "empty bin range"));
        }

        Ok(Self {
            bins,
            threshold: parse_number(threshold, part)?,
        })
    }
}

impl FromStr for BinSpec {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        if spec.trim().is_empty() {
            return Ok(Self::default());
        }
        let entries = spec
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<BinSpecEntry>, _>>()?;
        Ok(Self { entries })
    }
}

impl fmt::Display for BinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges_and_singles() {
        let spec = BinSpec::parse("0..105:2000,1943..2048:2000,600:17", 2048).unwrap();
        assert_eq!(spec.entries().len(), 3);
        assert_eq!(spec.entries()[0].bins, 0..105);
        assert_eq!(spec.entries()[2].bins, 600..601);
        assert_eq!(spec.entries()[2].threshold, 17);
        assert_eq!(spec.unmasked_count(2048).unwrap(), 105 + 105 + 1);
    }

    #[test]
    fn test_empty_masks_everything() {
        let spec = BinSpec::parse("", 16).unwrap();
        let mask = spec.to_mask(16).unwrap();
        assert!(mask.iter().all(|b| b.is_none()));
    }

    #[test]
    fn test_display_round_trip_text() {
        let text = "1..7:100,12:5";
        let spec: BinSpec = text.parse().unwrap();
        assert_eq!(spec.to_string(), text);
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            BinSpec::parse("1..7", 16),
            Err(ConfigError::BinSpec { .. })
        ));
        assert!(BinSpec::parse("a..7:1", 16).is_err());
        assert!(BinSpec::parse("7..7:1", 16).is_err());
        assert!(BinSpec::parse("16:1", 16).is_err());
        assert!(BinSpec::parse("8..17:1", 16).is_err());
        assert!(BinSpec::parse("8..16:1", 16).is_ok());
    }

    #[test]
    fn test_rejects_largest_single_bin() {
        assert!(matches!(
            "4294967295:1".parse::<BinSpec>(),
            Err(ConfigError::BinSpec { .. })
        ));
        assert!(BinSpec::parse("4294967295:1", 16).is_err());
    }

    #[test]
    fn test_mask_thresholds() {
        let mut spec = BinSpec::new();
        spec.push(2..4, 10);
        spec.push(3..5, 20);
        let mask = spec.to_mask(8).unwrap();
        assert_eq!(
            mask,
            vec![None, None, Some(10), Some(20), Some(20), None, None, None]
        );
    }
}
