use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use pcap_flatten::capture::{convert_captures, CaptureOptions};
use pcap_flatten::config::{load_config, EtlConfig};
use pcap_flatten::log::init_logging;
use pcap_flatten::pipeline::{self, PipelineOptions};
use pcap_flatten::{read_schema, Compression};

#[derive(Debug, Parser)]
#[command(name = "pcap_flatten", version, about = "Flatten tshark JSON packet dumps into parquet")]
struct Cli {
    /// Config file (TOML/YAML/JSON); defaults to ./pcap_flatten.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of files processed at once
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

/// `--compression` values; kept out of the library so it does not depend on clap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    Uncompressed,
    Snappy,
    Zstd,
    Gzip,
    Lz4,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Uncompressed => Compression::Uncompressed,
            CompressionArg::Snappy => Compression::Snappy,
            CompressionArg::Zstd => Compression::Zstd,
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Lz4 => Compression::Lz4,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Flatten every JSON dump in INPUT_DIR into OUTPUT_DIR/<name>.parquet
    Flatten {
        input_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,
        /// Input file suffix, without the dot
        #[arg(long)]
        extension: Option<String>,
    },
    /// Print the column names stored in a parquet file
    Columns {
        file: PathBuf,
        /// Also print each column's type and the row count
        #[arg(long)]
        types: bool,
    },
    /// Convert .pcap/.pcapng captures into JSON dumps with tshark
    Capture {
        pcap_dir: Option<PathBuf>,
        json_dir: Option<PathBuf>,
        #[arg(long)]
        tshark: Option<PathBuf>,
    },
    /// Capture, then flatten the resulting JSON dumps
    Run {
        pcap_dir: Option<PathBuf>,
        json_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        #[arg(long)]
        tshark: Option<PathBuf>,
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn required(arg: Option<PathBuf>, configured: Option<PathBuf>, name: &str) -> Result<PathBuf> {
    arg.or(configured)
        .ok_or_else(|| anyhow!("missing {name}: pass it as an argument or set `{name}` in the config"))
}

/// Returns whether every artifact succeeded.
fn run(cli: Cli) -> Result<bool> {
    let cfg: EtlConfig = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_logging(cli.verbose, cfg.log_dir.as_deref())?;
    let num_threads = cli.threads.or(cfg.num_threads);

    match cli.command {
        Command::Flatten {
            input_dir,
            output_dir,
            compression,
            extension,
        } => {
            let input_dir = required(input_dir, cfg.input_dir.clone(), "input_dir")?;
            let output_dir = required(output_dir, cfg.output_dir.clone(), "output_dir")?;
            let options = PipelineOptions {
                input_extension: extension.unwrap_or(cfg.input_extension),
                compression: compression.map(Compression::from).unwrap_or(cfg.compression),
                num_threads,
            };

            let report = pipeline::run(&input_dir, &output_dir, &options)
                .with_context(|| format!("cannot flatten {}", input_dir.display()))?;
            println!(
                "flattened {} of {} files into {}",
                report.succeeded().count(),
                report.len(),
                output_dir.display()
            );
            Ok(report.is_success())
        }

        Command::Columns { file, types } => {
            let schema = read_schema(&file)
                .with_context(|| format!("cannot inspect {}", file.display()))?;
            if types {
                println!("# {} rows", schema.num_rows);
                for field in &schema.fields {
                    println!("{}\t{:?}", field.name, field.data_type);
                }
            } else {
                for name in schema.column_names() {
                    println!("{name}");
                }
            }
            Ok(true)
        }

        Command::Capture {
            pcap_dir,
            json_dir,
            tshark,
        } => {
            let pcap_dir = required(pcap_dir, cfg.pcap_dir.clone(), "pcap_dir")?;
            let json_dir = required(json_dir, cfg.input_dir.clone(), "input_dir")?;
            let options = CaptureOptions {
                tshark_path: tshark.unwrap_or(cfg.tshark_path),
                num_threads,
            };

            let report = convert_captures(&pcap_dir, &json_dir, &options)
                .with_context(|| format!("cannot convert captures in {}", pcap_dir.display()))?;
            println!(
                "converted {} of {} captures into {}",
                report.succeeded().count(),
                report.len(),
                json_dir.display()
            );
            Ok(report.is_success())
        }

        Command::Run {
            pcap_dir,
            json_dir,
            output_dir,
            tshark,
            compression,
        } => {
            let pcap_dir = required(pcap_dir, cfg.pcap_dir.clone(), "pcap_dir")?;
            let json_dir = required(json_dir, cfg.input_dir.clone(), "input_dir")?;
            let output_dir = required(output_dir, cfg.output_dir.clone(), "output_dir")?;

            let captured = convert_captures(
                &pcap_dir,
                &json_dir,
                &CaptureOptions {
                    tshark_path: tshark.unwrap_or(cfg.tshark_path),
                    num_threads,
                },
            )
            .with_context(|| format!("cannot convert captures in {}", pcap_dir.display()))?;

            info!(json_dir = %json_dir.display(), "flattening converted captures");
            let options = PipelineOptions {
                input_extension: "json".to_string(),
                compression: compression.map(Compression::from).unwrap_or(cfg.compression),
                num_threads,
            };
            let flattened = pipeline::run(&json_dir, &output_dir, &options)
                .with_context(|| format!("cannot flatten {}", json_dir.display()))?;

            println!(
                "converted {} of {} captures, flattened {} of {} files into {}",
                captured.succeeded().count(),
                captured.len(),
                flattened.succeeded().count(),
                flattened.len(),
                output_dir.display()
            );
            Ok(captured.is_success() && flattened.is_success())
        }
    }
}
