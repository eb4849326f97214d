mod pipeline;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sd_dsp::{CaptureParameters, ReceiverConfig};

#[derive(Parser, Debug)]
#[command(name = "sparsdr-ingest")]
#[command(about = "Inspect and distribute SparSDR compressed captures")]
struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map bands to FFT bins and print the bin specification for the radio
    Bins {
        /// JSON receiver configuration (replaces the other options)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Capture center frequency in Hz
        #[arg(short = 'c', long, default_value = "2.45e9")]
        center: f32,

        /// Capture sample rate (FFT bandwidth) in Hz
        #[arg(short = 'r', long, default_value = "100e6")]
        sample_rate: f32,

        /// Analog filter bandwidth in Hz (defaults to the sample rate)
        #[arg(long)]
        filter_bw: Option<f32>,

        /// Compression FFT size
        #[arg(short = 'n', long, default_value = "2048")]
        fft_size: u32,

        /// Threshold for every unmasked bin
        #[arg(short = 't', long, default_value = "0")]
        threshold: u32,

        /// Band as FREQ:BW in Hz. Prefix FREQ with + or - for an offset from
        /// the center; suffix BW with "bins" for a bin count.
        #[arg(short = 'b', long = "band", allow_hyphen_values = true)]
        bands: Vec<String>,
    },

    /// Decode a recorded compressed capture
    Parse {
        /// Capture file
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Compression FFT size
        #[arg(short = 'n', long, default_value = "2048")]
        fft_size: u32,

        /// Sample format of the capture
        #[arg(long, value_enum, default_value = "v2")]
        format: CaptureFormat,

        /// Print assembled windows instead of individual samples
        #[arg(long)]
        windows: bool,

        /// Print statistics
        #[arg(long)]
        stats: bool,
    },

    /// Spread samples from named pipes across a fixed number of decoder outputs
    Distribute {
        /// Input named pipe, in the order the writers open them
        #[arg(short = 'p', long = "pipe", required = true)]
        pipes: Vec<PathBuf>,

        /// Number of decoder slots
        #[arg(short = 'd', long, default_value = "4")]
        decoders: usize,

        /// Bytes per item; items are never split across outputs
        #[arg(short = 's', long, default_value = "4")]
        item_size: usize,

        /// Most items copied into one output per cycle
        #[arg(long, default_value = "8192")]
        max_items: usize,

        /// Directory for the per-decoder output files
        #[arg(short = 'o', long)]
        out_dir: PathBuf,

        /// Print statistics
        #[arg(long)]
        stats: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureFormat {
    V2,
    #[value(name = "v1-n210")]
    V1N210,
    #[value(name = "v1-pluto")]
    V1Pluto,
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Command::Bins {
            config,
            center,
            sample_rate,
            filter_bw,
            fft_size,
            threshold,
            bands,
        } => {
            let config = match config {
                Some(path) => ReceiverConfig::from_json_file(&path).map_err(|e| e.to_string()),
                None => CaptureParameters::new(
                    center,
                    sample_rate,
                    filter_bw.unwrap_or(sample_rate),
                    fft_size,
                )
                .map_err(|e| e.to_string())
                .and_then(|capture| {
                    let bands = bands
                        .iter()
                        .map(|b| pipeline::parse_band(b))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(ReceiverConfig {
                        capture,
                        threshold,
                        bands,
                    })
                }),
            };
            config.and_then(|config| pipeline::run_bins(&config))
        }
        Command::Parse {
            file,
            fft_size,
            format,
            windows,
            stats,
        } => pipeline::run_parse(&file, fft_size, format, windows, stats),
        Command::Distribute {
            pipes,
            decoders,
            item_size,
            max_items,
            out_dir,
            stats,
        } => {
            if decoders == 0 || item_size == 0 || max_items == 0 {
                Err("decoders, item size and max items must be non-zero".to_string())
            } else {
                pipeline::run_distribute(&pipes, decoders, item_size, max_items, &out_dir, stats)
            }
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
