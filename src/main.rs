//! # Pageflow CLI
//!
//! Usage:
//!   pageflow export article.json -o trip.pdf --theme sepia --dpi 200
//!   pageflow export article.json --config options.json
//!   pageflow layout article.json > document.json
//!   pageflow themes

use clap::{ArgAction, Parser, Subcommand};
use pageflow::model::{Orientation, PageFormat};
use pageflow::theme::ThemeRegistry;
use pageflow::{Article, ExportOptions, ExportService};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pageflow")]
#[command(about = "Export articles to paginated, themed PDFs")]
#[command(version)]
struct Cli {
    /// More logging (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by commands that lay out an article.
#[derive(clap::Args)]
struct LayoutArgs {
    /// Article JSON
    input: PathBuf,

    /// Export options JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Theme name (see `pageflow themes`)
    #[arg(long)]
    theme: Option<String>,

    /// Page format: a3, a4, a5, letter, legal
    #[arg(long, value_parser = parse_format)]
    format: Option<PageFormat>,

    #[arg(long)]
    landscape: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render an article to PDF
    Export {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Output file; defaults to the generated filename
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render resolution
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Print the laid-out document as JSON
    Layout {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// List available themes
    Themes,
}

fn parse_format(name: &str) -> Result<PageFormat, String> {
    PageFormat::from_name(name).ok_or_else(|| format!("unknown page format '{}'", name))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_options(args: &LayoutArgs) -> Result<ExportOptions, Box<dyn std::error::Error>> {
    let mut options = match &args.config {
        Some(path) => ExportOptions::from_path(path)?,
        None => ExportOptions::default(),
    };
    if let Some(theme) = &args.theme {
        options.theme = theme.clone();
    }
    if let Some(format) = args.format {
        options.page_format = format;
    }
    if args.landscape {
        options.orientation = Orientation::Landscape;
    }
    Ok(options)
}

fn read_article(path: &Path) -> Result<Article, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(Article::from_json(&json)?)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Export {
            layout,
            output,
            dpi,
        } => {
            let mut options = load_options(&layout)?;
            if let Some(dpi) = dpi {
                options.dpi = dpi;
            }
            let article = read_article(&layout.input)?;
            let service = ExportService::new(options)?;
            let result = service.export_with_progress(&article, |percent, message| {
                log::info!("[{:>3}%] {}", percent, message);
            })?;
            let path = output.unwrap_or_else(|| PathBuf::from(&result.filename));
            std::fs::write(&path, &result.bytes)?;
            eprintln!(
                "✓ Written {} pages ({} bytes) to {}",
                result.page_count,
                result.size,
                path.display()
            );
        }
        Command::Layout { layout } => {
            let options = load_options(&layout)?;
            let article = read_article(&layout.input)?;
            let document = ExportService::new(options)?.layout(&article);
            println!("{}", document.to_json()?);
        }
        Command::Themes => {
            for name in ThemeRegistry::new().names() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
