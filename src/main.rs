//! # dce CLI
//!
//! Builds consultation documents from DCE archives.
//!
//! ## Usage
//!
//! ```bash
//! dce --config ./config/dce.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dce extract <archive>` | Print the selected quantitative table as line items |
//! | `dce build <archive> --out <docx>` | Synthesize the consultation document |
//! | `dce analyze <archive>` | Run the keyword classifiers and print a JSON report |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect what would go into the table
//! dce extract DCE_Residence_Les_Pins_Lot5.zip --json
//!
//! # Build with project and lot inferred from the archive name
//! dce build DCE_Residence_Les_Pins_Lot5.zip --template fiche.docx \
//!     --descriptif-file descriptif.txt --out fiche_lot5.docx
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dce_fiche::archive::ArchiveBundle;
use dce_fiche::assemble::build_document;
use dce_fiche::classify::{analyze_archive, ClassifierRegistry};
use dce_fiche::config::{self, Config};
use dce_fiche::models::{canonical_labels, LineItem};
use dce_fiche::pipeline::extract_line_items;
use dce_fiche::request::{build_request, DisplayFields};

/// Builds a tender consultation document from a DCE archive and a Word
/// template.
///
/// `--config` is optional; without it every setting takes its default.
/// See `config/dce.example.toml` for the available keys.
#[derive(Parser)]
#[command(
    name = "dce",
    version,
    about = "Builds a tender consultation document from a DCE archive and a Word template",
    long_about = None,
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Select the quantitative table in an archive and print its line items.
    Extract {
        /// Path to the DCE archive (.zip).
        archive: PathBuf,

        /// Print the line items as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Synthesize the consultation document.
    ///
    /// Project, lot and client default to the archive's bundled metadata,
    /// then to its file name (`DCE_<project>_Lot<n>.zip`).
    Build {
        /// Path to the DCE archive (.zip).
        archive: PathBuf,

        /// Output `.docx` path.
        #[arg(long)]
        out: PathBuf,

        /// Template `.docx`. Falls back to `[template].path` from the config.
        #[arg(long)]
        template: Option<PathBuf>,

        /// Project name shown in the document.
        #[arg(long)]
        project: Option<String>,

        /// Lot number.
        #[arg(long)]
        lot: Option<String>,

        #[arg(long)]
        client: Option<String>,

        /// Descriptive text replacing the descriptive marker.
        #[arg(long, conflicts_with = "descriptif_file")]
        descriptif: Option<String>,

        /// Read the descriptive text from a file.
        #[arg(long)]
        descriptif_file: Option<PathBuf>,
    },

    /// Run the keyword classifiers over the archive and print a JSON report.
    Analyze {
        /// Path to the DCE archive (.zip).
        archive: PathBuf,
    },
}

fn init_tracing(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "dce_fiche=info",
        1 => "dce_fiche=debug",
        _ => "dce_fiche=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn open_archive(path: &Path) -> Result<ArchiveBundle> {
    ArchiveBundle::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))
}

fn print_items(items: &[LineItem]) {
    let labels = canonical_labels();
    let rows: Vec<_> = items.iter().map(LineItem::cells).collect();
    let mut widths: Vec<usize> = labels.iter().map(|l| l.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    println!("{}", line(labels.as_slice()));
    for row in &rows {
        println!("{}", line(row.as_slice()));
    }
}

fn run_extract(cfg: &Config, archive: &Path, json: bool) -> Result<()> {
    let bundle = open_archive(archive)?;
    let extraction = extract_line_items(&bundle, cfg)?;

    if json {
        let out = serde_json::json!({
            "candidate": extraction.candidate,
            "sheet": extraction.sheet,
            "dropped": extraction.dropped,
            "items": extraction.items,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match &extraction.sheet {
        Some(sheet) => println!(
            "Candidate: {} (sheet {}, score {})",
            extraction.candidate.name, sheet, extraction.candidate.match_score
        ),
        None => println!(
            "Candidate: {} (score {})",
            extraction.candidate.name, extraction.candidate.match_score
        ),
    }
    println!(
        "{} line item(s), {} row(s) dropped",
        extraction.items.len(),
        extraction.dropped
    );
    println!();
    print_items(&extraction.items);
    Ok(())
}

struct BuildArgs {
    archive: PathBuf,
    out: PathBuf,
    template: Option<PathBuf>,
    fields: DisplayFields,
    descriptif: Option<String>,
    descriptif_file: Option<PathBuf>,
}

fn run_build(cfg: &Config, args: BuildArgs) -> Result<()> {
    let template_path = args
        .template
        .or_else(|| cfg.template.path.clone())
        .context("No template given: pass --template or set [template].path")?;
    let template = std::fs::read(&template_path)
        .with_context(|| format!("Failed to read template: {}", template_path.display()))?;

    let descriptive = match (args.descriptif, args.descriptif_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read descriptive text: {}", path.display()))?,
        (None, None) => String::new(),
    };

    let bundle = open_archive(&args.archive)?;
    let extraction = extract_line_items(&bundle, cfg)?;
    let request = build_request(
        args.fields,
        &bundle,
        descriptive,
        extraction.items,
        Some(extraction.candidate.name),
    )?;

    let bytes = build_document(&request, &template, cfg)?;
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("Failed to write output: {}", args.out.display()))?;

    println!(
        "Wrote {} ({} line item(s), project {}, lot {})",
        args.out.display(),
        request.items.len(),
        request.project,
        request.lot
    );
    Ok(())
}

async fn run_analyze(cfg: Config, archive: &Path) -> Result<()> {
    let bundle = open_archive(archive)?;
    let registry = ClassifierRegistry::with_builtins();
    let report = analyze_archive(Arc::new(bundle), Arc::new(cfg), &registry).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Extract { archive, json } => {
            run_extract(&cfg, &archive, json)?;
        }
        Commands::Build {
            archive,
            out,
            template,
            project,
            lot,
            client,
            descriptif,
            descriptif_file,
        } => {
            let args = BuildArgs {
                archive,
                out,
                template,
                fields: DisplayFields {
                    project,
                    lot,
                    client,
                },
                descriptif,
                descriptif_file,
            };
            run_build(&cfg, args)?;
        }
        Commands::Analyze { archive } => {
            run_analyze(cfg, &archive).await?;
        }
    }

    Ok(())
}
