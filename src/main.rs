mod config;
mod parser;
mod pdf;
mod reference;
mod source;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Settings;
use crate::pdf::{PageSource, PdfDocument};
use crate::source::Source;

#[derive(Parser)]
#[command(name = "isaref", about = "Extract an instruction reference from an ISA manual PDF")]
struct Cli {
    /// Config file (default: ./isaref.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the manual and write the mnemonic -> docs JSON
    Extract {
        /// PDF path or http(s) URL (default: `source` from config)
        source: Option<String>,
        /// Output JSON file (default: `output` from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Indent the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// List the lines of one page with their font ids
    Fonts {
        /// PDF path or http(s) URL (default: `source` from config)
        source: Option<String>,
        /// Zero-based page index
        #[arg(short, long)]
        page: usize,
    },
    /// Show the docs for an instruction from a generated reference
    Lookup {
        mnemonic: String,
        /// Reference JSON (default: `output` from config)
        #[arg(short, long)]
        reference: Option<PathBuf>,
        /// List every mnemonic starting with MNEMONIC instead
        #[arg(long)]
        prefix: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            source,
            output,
            pretty,
        } => {
            let source = resolve_source(source, &settings)?;
            let output = output.unwrap_or_else(|| settings.output.clone());

            let acquired = source.acquire(&settings.http)?;
            let doc = PdfDocument::open(acquired.path(), settings.layout.line_tolerance)?;
            info!("Loaded {} pages from {:?}", doc.page_count(), acquired.path());

            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages")?
                    .progress_chars("#>-"),
            );
            let specs = parser::extract(&doc, &settings.layout, &pb)?;
            let records = specs.len();

            let folded = reference::fold(specs);
            reference::write(&output, &folded.reference, pretty)?;
            println!(
                "Wrote {} instructions to {} ({} records, {} duplicates overwritten)",
                folded.reference.len(),
                output.display(),
                records,
                folded.duplicates,
            );
        }
        Commands::Fonts { source, page } => {
            let source = resolve_source(source, &settings)?;
            let acquired = source.acquire(&settings.http)?;
            let doc = PdfDocument::open(acquired.path(), settings.layout.line_tolerance)?;
            let page = doc.page(page)?;

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for line in &page.lines {
                println!("{:<40} | {}", line.font, line.text);
                *counts.entry(line.font.as_str()).or_default() += 1;
            }

            println!("\n--- Fonts ---");
            for (font, n) in &counts {
                println!("{:>5}  {}", n, font);
            }
            if page.skipped_runs > 0 {
                println!("{:>5}  (unreadable runs)", page.skipped_runs);
            }
        }
        Commands::Lookup {
            mnemonic,
            reference: path,
            prefix,
        } => {
            let path = path.unwrap_or_else(|| settings.output.clone());
            let docs = reference::load(&path)?;
            if prefix {
                let names = reference::complete(&docs, &mnemonic);
                if names.is_empty() {
                    println!("No instructions start with {:?}.", mnemonic);
                }
                for name in names {
                    println!("{}", name);
                }
            } else {
                match reference::lookup(&docs, &mnemonic) {
                    Some(doc) => println!("{}", doc),
                    None => anyhow::bail!("{:?} is not in {}", mnemonic, path.display()),
                }
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }
    Ok(())
}

fn resolve_source(arg: Option<String>, settings: &Settings) -> anyhow::Result<Source> {
    arg.or_else(|| settings.source.clone())
        .map(|s| Source::parse(&s))
        .context("No PDF given: pass a path/URL or set `source` in the config")
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
