//! Invoice Merge CLI tool
//!
//! A command-line tool for flattening and merging invoice PDFs.

use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use std::path::PathBuf;
use std::process;

use invoice_merge::pdf::{merge_pdfs, merge_pdfs_with, GhostscriptFlattener, MergeOptions};
use invoice_merge::Error;

/// Invoice Merge - Flatten and merge invoice PDFs into one document
#[derive(Parser)]
#[command(name = "invoice-merge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Flatten a cover sheet and an invoice into one file
    invoice-merge merge cover-sheet.pdf invoice.pdf -o final-invoice.pdf

    # Merge every PDF in a folder, in name order
    invoice-merge merge \"2026-03/*.pdf\" -o march.pdf --overwrite

    # Keep the first input's title/author and open the result
    invoice-merge merge cover.pdf invoice.pdf -o out.pdf --keep-metadata --open

    # Flatten through Ghostscript instead of the built-in engine
    invoice-merge merge form.pdf -o flat.pdf --engine ghostscript")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which flattening engine to run
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// In-process appearance-stream burning (no external tools)
    Builtin,
    /// Re-render through Ghostscript (requires gs on PATH)
    Ghostscript,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten input PDFs and merge them into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Replace the output file if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Copy title/author metadata from the first input
        #[arg(long)]
        keep_metadata: bool,

        /// Flattening engine
        #[arg(long, value_enum, default_value = "builtin")]
        engine: Engine,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            inputs,
            output,
            overwrite,
            keep_metadata,
            engine,
            open,
        } => cmd_merge(inputs, output, overwrite, keep_metadata, engine, open),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<Error>()
            .map(Error::exit_code)
            .unwrap_or(1);
        process::exit(code);
    }
}

/// Expand glob patterns in input paths.
///
/// Matches within one pattern are sorted so folder contents merge in name
/// order; literal paths keep their command-line position (and duplicates),
/// since input order decides page order.
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>, Error> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let entries = glob(&pattern).map_err(|e| Error::InvalidGlob(e.to_string()))?;

            let mut matched = Vec::new();
            for entry in entries {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                return Err(Error::NoFilesMatched(pattern));
            }
            matched.sort();
            paths.extend(matched);
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Open a file with the system default application
fn open_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Flatten and merge the inputs into one PDF
fn cmd_merge(
    inputs: Vec<String>,
    output: PathBuf,
    overwrite: bool,
    keep_metadata: bool,
    engine: Engine,
    open: bool,
) -> anyhow::Result<()> {
    let inputs = expand_globs(inputs)?;

    eprintln!("Merging {} PDF files...", inputs.len());

    let options = MergeOptions {
        input_paths: inputs,
        output_path: output.clone(),
        overwrite,
        keep_metadata,
    };

    let summary = match engine {
        Engine::Builtin => merge_pdfs(&options)?,
        Engine::Ghostscript => merge_pdfs_with(&options, &GhostscriptFlattener::default())?,
    };

    eprintln!(
        "Merged {} pages from {} files into: {}",
        summary.pages,
        summary.inputs,
        output.display()
    );

    if open {
        open_file(&output).map_err(|e| anyhow::anyhow!("failed to open output: {}", e))?;
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> anyhow::Result<()> {
    let metadata = invoice_merge::pdf::extract_metadata(&input)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}
