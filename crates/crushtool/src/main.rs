//! `crushtool`: the thin CLI over the `crush` compiler/decompiler library.
//!
//! Every decision of substance (parse, build, finalize, encode, decode,
//! decompile) lives in the `crush` crate and is unit-tested there; this
//! binary only wires argv to the library and reports failures the way
//! §6/§7 describe.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crush::CrushError;

/// Compile a textual CRUSH map to its binary form, or decompile a binary
/// CRUSH map back to text.
#[derive(Parser, Debug)]
#[command(name = "crushtool", about = "CRUSH map compiler/decompiler", long_about = None)]
struct Cli {
    /// Compile the given CRUSH map text file to binary.
    #[arg(short = 'c', long = "compile", value_name = "TEXT_IN")]
    compile: Option<PathBuf>,

    /// Decompile the given binary CRUSH map file to text.
    #[arg(short = 'd', long = "decompile", value_name = "BINARY_IN")]
    decompile: Option<PathBuf>,

    /// Write output to this file instead of stdout/a status message.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(long)]
    clobber: bool,

    /// Increase verbosity; repeatable (0=warn, 1=info, 2=debug, 3+=trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap's own exit codes (2 for usage errors) don't match §6's
            // "exit 1 on argument error"; print its message and fail uniformly.
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match (&cli.compile, &cli.decompile) {
        (Some(_), Some(_)) => bail!("specify exactly one of -c or -d, not both"),
        (None, None) => bail!("specify either -c <text-in> or -d <binary-in>"),
        (Some(input), None) => do_compile(input, cli.output.as_deref(), cli.clobber),
        (None, Some(input)) => do_decompile(input, cli.output.as_deref(), cli.clobber),
    }
}

fn check_output_target(output: Option<&std::path::Path>, clobber: bool) -> Result<()> {
    if let Some(path) = output {
        if !clobber && path.exists() {
            bail!(
                "output file already exists (use --clobber to overwrite): {}",
                path.display()
            );
        }
    }
    Ok(())
}

fn do_compile(input: &std::path::Path, output: Option<&std::path::Path>, clobber: bool) -> Result<()> {
    check_output_target(output, clobber)?;

    let source = fs::read_to_string(input)
        .with_context(|| format!("failed to read input file: {}", input.display()))?;

    let map = crush::compile(&source).map_err(|err| parse_or_semantic_error(&input.display().to_string(), err))?;
    let bytes = crush::encode_map(&map);

    match output {
        Some(path) => {
            fs::write(path, &bytes)
                .with_context(|| format!("failed to write output file: {}", path.display()))?;
            tracing::info!(bytes = bytes.len(), path = %path.display(), "wrote compiled CRUSH map");
        }
        None => {
            println!(
                "compiled CRUSH map from '{}' ({} bytes)",
                input.display(),
                bytes.len()
            );
        }
    }
    Ok(())
}

fn do_decompile(input: &std::path::Path, output: Option<&std::path::Path>, clobber: bool) -> Result<()> {
    check_output_target(output, clobber)?;

    let raw = fs::read(input)
        .with_context(|| format!("failed to read input file: {}", input.display()))?;
    let mut data = bytes::Bytes::from(raw);

    let map = crush::CrushMap::decode(&mut data)
        .with_context(|| format!("failed to decode CRUSH map: {}", input.display()))?;
    let text = crush::decompile(&map)
        .with_context(|| format!("failed to decompile CRUSH map: {}", input.display()))?;

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("failed to write output file: {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote decompiled CRUSH map");
        }
        None => {
            print!("{text}");
        }
    }
    Ok(())
}

/// Render a lex/parse or semantic failure the way §7 specifies:
/// `<file>:<line>: error: parse error at '<fragment>'` for lex/parse
/// errors, a single diagnostic line for semantic ones.
fn parse_or_semantic_error(file: &str, err: CrushError) -> anyhow::Error {
    match err {
        CrushError::Parse { location, fragment, .. } => {
            anyhow::anyhow!("{file}:{}: error: parse error at '{fragment}'", location.line)
        }
        other => anyhow::anyhow!("{file}: {other}"),
    }
}
