use std::f64::consts::PI;

/// Hann window scaled to the full u16 range, as loaded into the compression FFT.
///
/// The FPGA ships with a window for its default FFT size; any other size
/// needs these values written before the FFT is started.
pub fn rounded_hann_window(bins: usize) -> Vec<u16> {
    if bins < 2 {
        return vec![u16::MAX; bins];
    }
    let denom = (bins - 1) as f64;
    (0..bins)
        .map(|i| {
            let value = 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos());
            (value * 65535.0).round() as u16
        })
        .collect()
}
