use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use zio_codecs::{compressor_with_level, register_all_codecs};
use zio_core::{CompressionFactory, Compressor, FileCompression, Fsync, Reader, INPUT_BUFFER_SIZE};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "zio",
    about = "Compress and decompress byte streams with bzip2, gzip, zstd, or lz4",
    version
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file
    Compress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Format: none | gzip | bzip2 | zstd | lz4 (default: from output suffix)
        #[arg(short, long)]
        format: Option<FileCompression>,
        /// Compression level (gzip 0–9, zstd 1–22; other formats ignore it)
        #[arg(short, long)]
        level: Option<i32>,
        /// fsync the output before closing it
        #[arg(long)]
        fsync: bool,
    },
    /// Decompress a file
    Decompress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Format: none | gzip | bzip2 | zstd | lz4 (default: from input suffix)
        #[arg(short, long)]
        format: Option<FileCompression>,
        /// Load the whole input into memory and decode it from the buffer
        #[arg(long)]
        in_memory: bool,
    },
    /// List the registered compression formats
    Formats,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn format_for(path: &Path, explicit: Option<FileCompression>) -> FileCompression {
    explicit.unwrap_or_else(|| {
        if is_stdio(path) {
            FileCompression::None
        } else {
            FileCompression::from_path(path)
        }
    })
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        let file = File::open(path).with_context(|| format!("opening input file {:?}", path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn open_output(path: &Path) -> anyhow::Result<Box<dyn Write>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdout().lock()))
    } else {
        let file = File::create(path).with_context(|| format!("creating output file {:?}", path))?;
        Ok(Box::new(file))
    }
}

fn print_stats(raw: u64, compressed: Option<u64>, elapsed: std::time::Duration) {
    eprintln!("  raw size    : {}", human_bytes(raw));
    if let Some(compressed) = compressed {
        eprintln!("  compressed  : {}", human_bytes(compressed));
        if compressed > 0 {
            eprintln!("  ratio       : {:.2}x", raw as f64 / compressed as f64);
        }
    }
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw as f64 / elapsed.as_secs_f64().max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    format: Option<FileCompression>,
    level: Option<i32>,
    fsync: bool,
) -> anyhow::Result<()> {
    let compression = format_for(&output, format);
    let sync = if fsync { Fsync::Yes } else { Fsync::No };

    // The compressor writes through a duplicate; `dst` stays ours to close.
    let dst: Box<dyn AsRawFd> = if is_stdio(&output) {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(&output).with_context(|| format!("creating output file {:?}", output))?)
    };
    let mut compressor: Box<dyn Compressor> = match level {
        Some(level) => compressor_with_level(compression, dst.as_raw_fd(), sync, level)?,
        None => CompressionFactory::instance().create_compressor(compression, dst.as_raw_fd(), sync)?,
    };

    let t0 = Instant::now();
    let mut src = open_input(&input)?;
    let mut buf = vec![0u8; INPUT_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        compressor.write(&buf[..n])?;
        total += n as u64;
    }
    compressor
        .close()
        .with_context(|| format!("finishing {} output {:?}", compression, output))?;
    let elapsed = t0.elapsed();

    eprintln!("  format      : {}", compression);
    let compressed = if is_stdio(&output) {
        None
    } else {
        Some(std::fs::metadata(&output)?.len())
    };
    print_stats(total, compressed, elapsed);
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: PathBuf,
    format: Option<FileCompression>,
    in_memory: bool,
) -> anyhow::Result<()> {
    let compression = format_for(&input, format);
    let mut dst = open_output(&output)?;
    let t0 = Instant::now();

    let total = if in_memory {
        let mut compressed = Vec::new();
        open_input(&input)?.read_to_end(&mut compressed)?;
        let mut reader = Reader::from_buffer(&compressed, compression)?;
        copy_chunks(&mut reader, &mut dst)?
    } else if is_stdio(&input) {
        let stdin = io::stdin();
        let mut reader = Reader::from_fd(stdin.as_raw_fd(), compression)?;
        copy_chunks(&mut reader, &mut dst)?
    } else {
        let mut reader = Reader::open(&input, Some(compression))
            .with_context(|| format!("opening {} input {:?}", compression, input))?;
        copy_chunks(&mut reader, &mut dst)?
    };
    dst.flush()?;

    eprintln!("  format      : {}", compression);
    print_stats(total, None, t0.elapsed());
    Ok(())
}

/// Pump every chunk of `reader` into `dst`; returns the bytes written.
fn copy_chunks(reader: &mut Reader<'_>, dst: &mut dyn Write) -> anyhow::Result<u64> {
    loop {
        let chunk = reader.read_chunk()?;
        if chunk.is_empty() {
            break;
        }
        dst.write_all(&chunk)?;
    }
    Ok(reader.raw_bytes())
}

fn run_formats() {
    for compression in CompressionFactory::instance().registered() {
        match compression.suffix() {
            Some(suffix) => println!("{:<6} .{}", compression.as_str(), suffix),
            None => println!("{}", compression),
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    register_all_codecs();

    match cli.command {
        Commands::Compress {
            input,
            output,
            format,
            level,
            fsync,
        } => run_compress(input, output, format, level, fsync),
        Commands::Decompress {
            input,
            output,
            format,
            in_memory,
        } => run_decompress(input, output, format, in_memory),
        Commands::Formats => {
            run_formats();
            Ok(())
        }
    }
}
