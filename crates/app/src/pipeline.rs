use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam::channel;

use sd_dsp::{BandCenter, BandSpec, BandWidth, ReceiverConfig, ReceiverSetup};
use sd_output::PipeDistributor;
use sd_protocol::v1::{V1Assembler, V1Layout};
use sd_protocol::{words_from_le_bytes, ParsedEvent, StreamDecoder, Window, WindowAssembler, WindowKind};
use sd_sdr::file::CompressedFileSource;
use sd_sdr::CompressedSource;

use crate::CaptureFormat;

/// Parse a `FREQ:BW` band argument
pub fn parse_band(text: &str) -> Result<BandSpec, String> {
    let (freq, width) = text
        .split_once(':')
        .ok_or_else(|| format!("band '{}' is not FREQ:BW", text))?;
    let number = |s: &str| -> Result<f32, String> {
        s.trim()
            .parse::<f32>()
            .map_err(|_| format!("band '{}': '{}' is not a number", text, s))
    };

    let center = if freq.starts_with('+') || freq.starts_with('-') {
        BandCenter::Relative(number(freq)?)
    } else {
        BandCenter::Absolute(number(freq)?)
    };
    let width = match width.strip_suffix("bins") {
        Some(bins) => BandWidth::Bins(
            bins.trim()
                .parse()
                .map_err(|_| format!("band '{}': bad bin count", text))?,
        ),
        None => BandWidth::Hertz(number(width)?),
    };
    Ok(BandSpec { center, width })
}

/// Print the bins each band needs and the combined bin specification.
pub fn run_bins(config: &ReceiverConfig) -> Result<(), String> {
    let setup = ReceiverSetup::new(config).map_err(|e| e.to_string())?;
    let capture = &config.capture;

    println!(
        "capture: {} Hz center, {} Hz wide, {} bins of {} Hz",
        capture.center_freq,
        capture.capture_bw,
        capture.fft_size,
        capture.bin_width()
    );
    for (i, band) in setup.bands.iter().enumerate() {
        let ranges: Vec<String> = band
            .range
            .ranges()
            .iter()
            .map(|r| format!("{}..{}", r.start, r.end))
            .collect();
        match band.range.freq() {
            Some(freq) => println!(
                "band {}: {} Hz, {} bins [{}], covers {:.4}..{:.4} MHz",
                i,
                band.center_freq,
                band.bins,
                ranges.join(", "),
                freq.start / 1e6,
                freq.end / 1e6
            ),
            None => println!(
                "band {}: {} Hz, {} bins [{}]",
                i,
                band.center_freq,
                band.bins,
                ranges.join(", ")
            ),
        }
    }
    println!("{}", setup.bin_spec);
    Ok(())
}

#[derive(Default)]
struct ParseStats {
    bytes: u64,
    fft_windows: u64,
    average_windows: u64,
    samples: u64,
}

/// Decode a capture file and print its contents.
pub fn run_parse(
    file_path: &Path,
    fft_size: u32,
    format: CaptureFormat,
    print_windows: bool,
    print_stats: bool,
) -> Result<(), String> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    parse_capture(&mut out, file_path, fft_size, format, print_windows, print_stats)
}

fn parse_capture<W: Write>(
    out: &mut W,
    file_path: &Path,
    fft_size: u32,
    format: CaptureFormat,
    print_windows: bool,
    print_stats: bool,
) -> Result<(), String> {
    if !fft_size.is_power_of_two() {
        return Err(format!("FFT size {} is not a power of two", fft_size));
    }
    if let Some(layout) = v1_layout(format) {
        if fft_size as usize > layout.max_fft_size() {
            return Err(format!(
                "FFT size {} too large for {:?} captures (max {})",
                fft_size,
                layout,
                layout.max_fft_size()
            ));
        }
    }

    let mut source = CompressedFileSource::new(file_path.to_string_lossy(), 0, 0);
    let (tx, rx) = channel::bounded(64);

    // Start file reader in a separate thread
    let reader_thread = std::thread::spawn(move || {
        if let Err(e) = source.start(tx) {
            log::error!("file reader error: {}", e);
        }
    });

    let mut stats = ParseStats::default();
    let stats_start = Instant::now();
    let mut last_stats = Instant::now();

    let mut decoder = StreamDecoder::new(fft_size);
    let mut assembler = WindowAssembler::new(fft_size as usize);
    let mut v1 = v1_layout(format).map(|layout| V1Assembler::new(layout, fft_size as usize));
    let mut carry = Vec::new();
    let mut words = Vec::new();
    let mut events = Vec::new();
    let mut windows = Vec::new();

    let mut failure = None;
    'blocks: for buf in rx.iter() {
        stats.bytes += buf.data.len() as u64;

        if let Some(v1) = v1.as_mut() {
            v1.push_bytes(&buf.data, &mut windows);
        } else {
            words.clear();
            events.clear();
            words_from_le_bytes(&mut carry, &buf.data, &mut words);
            decoder.push_words(&words, &mut events);
            for event in &events {
                count_event(&mut stats, event);
                if print_windows {
                    windows.extend(assembler.push(event));
                } else if let Err(e) = print_event(out, event) {
                    failure = Some(e.to_string());
                    break 'blocks;
                }
            }
        }

        for window in windows.drain(..) {
            if let Err(e) = print_window(out, &window, print_windows) {
                failure = Some(e.to_string());
                break 'blocks;
            }
            if v1.is_some() {
                count_window(&mut stats, &window);
            }
        }

        // Print stats every 5 seconds
        if print_stats && last_stats.elapsed().as_secs() >= 5 {
            eprintln!(
                "[{:.1}s] {} bytes, {} FFT windows, {} average windows",
                stats_start.elapsed().as_secs_f64(),
                stats.bytes,
                stats.fft_windows,
                stats.average_windows
            );
            last_stats = Instant::now();
        }
    }

    if let Some(e) = failure {
        // Dropping the receiver stops the reader at its next send
        drop(rx);
        let _ = reader_thread.join();
        return Err(e);
    }

    let last = match v1.as_mut() {
        Some(v1) => v1.finish(),
        None if print_windows => assembler.finish(),
        None => None,
    };
    if let Some(window) = last {
        print_window(out, &window, print_windows).map_err(|e| e.to_string())?;
        if v1.is_some() {
            count_window(&mut stats, &window);
        }
    }
    out.flush().map_err(|e| e.to_string())?;

    if !carry.is_empty() {
        log::warn!("capture ends with {} bytes of a partial word", carry.len());
    }

    // Final stats
    if print_stats {
        eprintln!(
            "done ({:.1}s): {} bytes, {} FFT windows, {} average windows, {} samples",
            stats_start.elapsed().as_secs_f64(),
            stats.bytes,
            stats.fft_windows,
            stats.average_windows,
            stats.samples
        );
        match v1.as_ref() {
            Some(v1) => eprintln!("dropped samples: {}", v1.dropped()),
            None => {
                let d = decoder.stats();
                eprintln!(
                    "words: {} decode errors: {} resyncs: {} skipped words: {} discarded windows: {}",
                    d.words,
                    d.decode_errors,
                    d.resyncs,
                    d.skipped_words,
                    assembler.discarded()
                );
            }
        }
    }

    // Wait for reader thread
    let _ = reader_thread.join();

    Ok(())
}

fn v1_layout(format: CaptureFormat) -> Option<V1Layout> {
    match format {
        CaptureFormat::V2 => None,
        CaptureFormat::V1N210 => Some(V1Layout::N210),
        CaptureFormat::V1Pluto => Some(V1Layout::Pluto),
    }
}

fn count_event(stats: &mut ParseStats, event: &ParsedEvent) {
    match event {
        ParsedEvent::FftWindowBegin { .. } => stats.fft_windows += 1,
        ParsedEvent::AverageWindowBegin { .. } => stats.average_windows += 1,
        ParsedEvent::FftSample { .. } | ParsedEvent::AverageSample { .. } => stats.samples += 1,
        ParsedEvent::FrameEnd | ParsedEvent::DecodeError(_) => {}
    }
}

fn count_window(stats: &mut ParseStats, window: &Window) {
    if window.is_average() {
        stats.average_windows += 1;
    } else {
        stats.fft_windows += 1;
    }
    stats.samples += window.active_bins() as u64;
}

fn print_event(out: &mut impl Write, event: &ParsedEvent) -> io::Result<()> {
    match event {
        ParsedEvent::FftWindowBegin { timestamp } => {
            writeln!(out, "FFT header at time stamp 0x{:08x}", timestamp)
        }
        ParsedEvent::FftSample {
            bin_index,
            real,
            imag,
        } => writeln!(out, "FFT, index {}: {}, {}", bin_index, real, imag),
        ParsedEvent::AverageWindowBegin { timestamp } => {
            writeln!(out, "Average header at time stamp 0x{:08x}", timestamp)
        }
        ParsedEvent::AverageSample {
            bin_index,
            magnitude,
        } => writeln!(out, "Avg, index {}: {}", bin_index, magnitude),
        ParsedEvent::FrameEnd => Ok(()),
        ParsedEvent::DecodeError(e) => writeln!(out, "ERROR: {}", e),
    }
}

fn print_window(out: &mut impl Write, window: &Window, summary: bool) -> io::Result<()> {
    if summary {
        let kind = if window.is_average() { "average" } else { "FFT" };
        return writeln!(
            out,
            "{} window at 0x{:08x}: {} active bins",
            kind,
            window.timestamp,
            window.active_bins()
        );
    }
    match &window.kind {
        WindowKind::Data(bins) => {
            writeln!(out, "FFT header at time stamp 0x{:08x}", window.timestamp)?;
            for (i, bin) in bins.iter().enumerate() {
                if bin.re != 0 || bin.im != 0 {
                    writeln!(out, "FFT, index {}: {}, {}", i, bin.re, bin.im)?;
                }
            }
        }
        WindowKind::Average(bins) => {
            writeln!(out, "Average header at time stamp 0x{:08x}", window.timestamp)?;
            for (i, magnitude) in bins.iter().enumerate() {
                writeln!(out, "Avg, index {}: {}", i, magnitude)?;
            }
        }
    }
    Ok(())
}

/// Distribute named pipe inputs across decoder output files until every
/// pipe has closed.
pub fn run_distribute(
    pipes: &[PathBuf],
    decoders: usize,
    item_size: usize,
    max_items: usize,
    out_dir: &Path,
    print_stats: bool,
) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|e| format!("failed to create {}: {}", out_dir.display(), e))?;
    let mut files = (0..decoders)
        .map(|slot| {
            let path = out_dir.join(format!("decoder{}.bin", slot));
            File::create(&path)
                .map(BufWriter::new)
                .map_err(|e| format!("failed to create {}: {}", path.display(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("waiting for writers on {} pipes", pipes.len());
    let mut dist = PipeDistributor::open(pipes, item_size, decoders).map_err(|e| e.to_string())?;
    let surplus = dist.surplus_monitor();

    let mut buffers = vec![vec![0u8; max_items * item_size]; decoders];
    let mut totals = vec![0u64; decoders];
    let mut starved_cycles = 0u64;
    let mut cycles = 0u64;
    let stats_start = Instant::now();
    let mut last_stats = Instant::now();

    while !dist.is_finished() {
        let report = {
            let mut outputs: Vec<&mut [u8]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            dist.work(&mut outputs, max_items).map_err(|e| e.to_string())?
        };
        cycles += 1;
        if report.starved > 0 {
            starved_cycles += 1;
        }
        for (slot, tag) in &report.tags {
            log::debug!("decoder {} at item {}: input {}", slot, tag.offset, tag.source);
        }
        for (slot, &items) in report.produced.iter().enumerate() {
            if items > 0 {
                files[slot]
                    .write_all(&buffers[slot][..items * item_size])
                    .map_err(|e| format!("write error: {}", e))?;
                totals[slot] += items as u64;
            }
        }

        // Print stats every 5 seconds
        if print_stats && last_stats.elapsed().as_secs() >= 5 {
            eprintln!(
                "[{:.1}s] cycles: {} items: {:?} surplus: {}",
                stats_start.elapsed().as_secs_f64(),
                cycles,
                totals,
                surplus.get()
            );
            last_stats = Instant::now();
        }
    }

    for file in &mut files {
        file.flush().map_err(|e| format!("write error: {}", e))?;
    }

    // Final stats
    if print_stats {
        eprintln!(
            "done ({:.1}s): cycles: {} items: {:?} cycles with starved inputs: {}",
            stats_start.elapsed().as_secs_f64(),
            cycles,
            totals,
            starved_cycles
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn capture_file(repeats: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let bytes: Vec<u8> = FRAME
            .iter()
            .cycle()
            .take(FRAME.len() * repeats)
            .flat_map(|w| w.to_le_bytes())
            .collect();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_capture_prints_frame() {
        let file = capture_file(1);
        let mut out = Vec::new();
        parse_capture(&mut out, file.path(), 1, CaptureFormat::V2, false, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "FFT header at time stamp 0x00000025\n\
             FFT, index 0: 10, 20\n\
             FFT header at time stamp 0x00000026\n\
             FFT, index 0: 932, -9921\n\
             Average header at time stamp 0x00000027\n\
             Avg, index 0: 10000003\n"
        );
    }

    #[test]
    fn test_parse_capture_write_error_stops_reader() {
        let file = capture_file(1 << 12);
        let result = parse_capture(&mut FailingWriter, file.path(), 1, CaptureFormat::V2, false, false);
        assert_eq!(result, Err("closed".to_string()));
    }

    #[test]
    fn test_parse_band() {
        assert_eq!(
            parse_band("2.44e9:2e6").unwrap(),
            BandSpec::absolute(2.44e9, 2e6)
        );
        assert_eq!(
            parse_band("-5e6:64bins").unwrap(),
            BandSpec {
                center: BandCenter::Relative(-5e6),
                width: BandWidth::Bins(64),
            }
        );
        assert!(parse_band("2.44e9").is_err());
        assert!(parse_band("x:1").is_err());
        assert!(parse_band("1:xbins").is_err());
    }

    #[test]
    fn test_parse_writes_events() {
        let mut out = Vec::new();
        print_event(&mut out, &ParsedEvent::FftWindowBegin { timestamp: 0x25 }).unwrap();
        print_event(
            &mut out,
            &ParsedEvent::FftSample {
                bin_index: 0,
                real: 10,
                imag: 20,
            },
        )
        .unwrap();
        print_event(&mut out, &ParsedEvent::FrameEnd).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "FFT header at time stamp 0x00000025\nFFT, index 0: 10, 20\n"
        );
    }
}
