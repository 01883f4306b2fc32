use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::{ContextKind, ErrorKind};
use clap::Parser;
use log::info;

use logslice::core::QuantaClock;
use logslice::slice::{slice_with, ScanMode, SliceOptions, TimeWindow};

/// Exit status for usage errors, including `-h`.
const USAGE_EXIT: u8 = 255;

#[derive(Parser, Debug)]
#[command(name = "logslice")]
#[command(about = "Copy the records of a time window from one log into a new log")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Input log directory
    #[arg(short = 'i', value_name = "input_log")]
    input: Option<PathBuf>,

    /// Output log directory (replaced if it exists)
    #[arg(short = 'o', value_name = "output_log")]
    output: Option<PathBuf>,

    /// Inclusive start time in seconds (default 0)
    #[arg(short = 's', value_name = "start_time", allow_negative_numbers = true)]
    start: Option<f64>,

    /// Inclusive end time in seconds (default: end of time)
    #[arg(short = 'e', value_name = "stop_time", allow_negative_numbers = true)]
    end: Option<f64>,

    /// Print usage and exit
    #[arg(short = 'h')]
    help: bool,

    /// Scan the whole input instead of stopping at the end time
    #[arg(long)]
    full_scan: bool,

    /// Segment size of the output log in bytes (default: same as input)
    #[arg(long)]
    segment_size: Option<usize>,
}

#[derive(Debug)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    options: SliceOptions,
}

#[derive(Debug)]
enum Invocation {
    Run(Args),
    Usage { message: Option<String> },
}

fn main() -> ExitCode {
    env_logger::init();
    let clock = logslice::core::initialize();

    let args = match parse_args(std::env::args_os()) {
        Invocation::Run(args) => args,
        Invocation::Usage { message } => {
            if let Some(message) = message {
                println!("{message}");
            }
            usage();
            return ExitCode::from(USAGE_EXIT);
        }
    };

    match run(&args, &clock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn usage() {
    println!("usage:");
    println!("logslice -i input_log -o output_log -s start_time -e stop_time");
    println!("         [--full-scan] [--segment-size bytes]");
}

fn parse_args<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => return Invocation::Usage { message: Some(describe(&err)) },
    };
    if cli.help {
        return Invocation::Usage { message: None };
    }

    let (input, output) = match (cli.input, cli.output) {
        (Some(input), Some(output)) => (input, output),
        _ => {
            return Invocation::Usage {
                message: Some("missing input or output log name!".to_string()),
            }
        }
    };

    let window =
        TimeWindow::from_secs_f64(cli.start.unwrap_or(0.0), cli.end.unwrap_or(f64::MAX));
    let options = SliceOptions {
        window,
        scan: if cli.full_scan {
            ScanMode::FullScan
        } else {
            ScanMode::Sorted
        },
        segment_size: cli.segment_size,
        ..SliceOptions::default()
    };

    Invocation::Run(Args {
        input,
        output,
        options,
    })
}

fn describe(err: &clap::Error) -> String {
    let arg = err.get(ContextKind::InvalidArg).map(ToString::to_string);
    match err.kind() {
        ErrorKind::UnknownArgument => {
            format!("unknown option: {}", arg.unwrap_or_default())
        }
        _ => match (arg, err.get(ContextKind::InvalidValue)) {
            (Some(arg), Some(value)) => format!("invalid value {value} for {arg}"),
            (Some(arg), None) => format!("invalid use of {arg}"),
            _ => "invalid arguments".to_string(),
        },
    }
}

fn run(args: &Args, clock: &QuantaClock) -> Result<()> {
    println!("reading from log: {}", args.input.display());
    println!("writing to log: {}", args.output.display());
    info!(
        "window [{}, {}] scan={:?}",
        args.options.window.start, args.options.window.end, args.options.scan
    );

    let stats = slice_with(&args.input, &args.output, &args.options, clock).with_context(|| {
        format!(
            "slice {} -> {}",
            args.input.display(),
            args.output.display()
        )
    })?;

    info!(
        "read {} records, wrote {}, skipped {}",
        stats.records_read, stats.records_written, stats.records_skipped
    );
    println!("total time: {} s", stats.elapsed.as_secs_f64());
    println!("message processing rate: {} hz", stats.rate());
    Ok(())
}
