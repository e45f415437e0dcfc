//! Synclog CLI

use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use synclog::{Config, FrameMode, FramedRawReader, TimeValue, TimestampedRecordReader};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Synclog v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: synclog <command> [options] [--config <file.toml>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  scan  <timestamps>                          List every record");
    eprintln!("  at    <timestamps> <sec.ms> [tolerance_ms]  Record valid at a time");
    eprintln!("  frame <timestamps> <raw> [frame_size] <sec.ms> [--subframes]");
    eprintln!("                                              Load the frame for a time");
    eprintln!("                                              (size defaults to frames.frame_size)");
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    if let Err(e) = run(&mut args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Remove `--name <value>` from `args`
fn take_option(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{name} needs a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

/// Remove `--name` from `args`
fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn load_config(path: Option<String>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(Path::new(&path))
            .with_context(|| format!("loading config {path}")),
        None => Ok(Config::default()),
    }
}

fn parse_time(arg: &str) -> anyhow::Result<TimeValue> {
    arg.parse()
        .map_err(|e| anyhow::anyhow!("invalid time {arg:?}: {e}"))
}

fn run(args: &mut Vec<String>) -> anyhow::Result<()> {
    let config = load_config(take_option(args, "--config")?)?;
    let subframes = take_flag(args, "--subframes");
    if args.is_empty() {
        usage();
    }
    let command = args.remove(0);

    match (command.as_str(), args.as_slice()) {
        ("scan", [timestamps]) => scan(Path::new(timestamps), &config),
        ("at", [timestamps, time]) => {
            let tolerance = config.search.default_tolerance_ms;
            at(Path::new(timestamps), parse_time(time)?, tolerance, &config)
        }
        ("at", [timestamps, time, tolerance]) => {
            let tolerance: u32 = tolerance
                .parse()
                .with_context(|| format!("invalid tolerance {tolerance:?}"))?;
            at(Path::new(timestamps), parse_time(time)?, tolerance, &config)
        }
        ("frame", [timestamps, raw, time]) => {
            let mut config = config;
            if subframes {
                config.frames.mode = FrameMode::Subframes;
            }
            let reader = FramedRawReader::from_config(timestamps, raw, &config)
                .context("frame size from configuration")?;
            frame(reader, parse_time(time)?)
        }
        ("frame", [timestamps, raw, frame_size, time]) => {
            let frame_size: usize = frame_size
                .parse()
                .with_context(|| format!("invalid frame size {frame_size:?}"))?;
            if frame_size == 0 {
                bail!("frame size must be > 0");
            }
            let mode = if subframes {
                FrameMode::Subframes
            } else {
                config.frames.mode
            };
            let reader =
                FramedRawReader::new(timestamps, raw, frame_size, &config)?.with_mode(mode);
            frame(reader, parse_time(time)?)
        }
        ("scan" | "at" | "frame", _) => usage(),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'synclog' for usage information.");
            process::exit(1);
        }
    }
}

fn scan(timestamps: &Path, config: &Config) -> anyhow::Result<()> {
    let mut reader = TimestampedRecordReader::new(timestamps, config)?;
    reader.reinit()?;

    let mut count = 0u64;
    while reader.next_timestamp()? {
        if let (Some(time), Some(payload)) = (reader.current(), reader.payload()) {
            println!("{time}\t{}", String::from_utf8_lossy(payload));
            count += 1;
        }
    }

    println!();
    println!("{count} records in {}", timestamps.display());
    Ok(())
}

fn at(
    timestamps: &Path,
    time: TimeValue,
    tolerance_ms: u32,
    config: &Config,
) -> anyhow::Result<()> {
    let mut reader = TimestampedRecordReader::new(timestamps, config)?;

    match reader.data_for_timestamp(time, tolerance_ms)? {
        Some(payload) => {
            let payload = String::from_utf8_lossy(payload).into_owned();
            let found = reader.current().unwrap_or_default();
            println!("{found}\t{payload}");
        }
        None => {
            let index = reader.index();
            match (index.previous(), index.current()) {
                (_, None) => println!("No records in {}", timestamps.display()),
                (None, Some(first)) => println!("No data yet at {time} (first record {first})"),
                (Some(previous), Some(_)) => {
                    println!("No data at {time} (nearest earlier record {previous})");
                }
            }
        }
    }

    Ok(())
}

fn frame(mut reader: FramedRawReader, time: TimeValue) -> anyhow::Result<()> {
    reader.reinit()?;

    if !reader.load_frame(time)? {
        println!("No frame at {time}");
        return Ok(());
    }

    println!("time:     {}", reader.records().current().unwrap_or_default());
    if let Some(number) = reader.frame_number() {
        println!("frame:    {number}");
    }
    println!("count:    {}", reader.subframe_count());
    println!("bytes:    {}", reader.frame().len());
    println!("seeks:    {}", reader.seek_count());
    Ok(())
}
