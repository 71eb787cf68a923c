//! CLI entry point for spacetraveling

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spacetraveling::cms::ReleaseRef;
use spacetraveling::generator::RenderOutcome;
use spacetraveling::Spacetraveling;

#[derive(Parser)]
#[command(name = "spacetraveling")]
#[command(version)]
#[command(about = "A blog front-end rendered from a headless CMS", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Read content from a fixture file instead of the CMS
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate static files
    #[command(alias = "g")]
    Generate {
        /// Render unpublished content from this preview ref
        #[arg(long)]
        preview_ref: Option<String>,
    },

    /// Start a local server
    #[command(alias = "s")]
    Server {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// IP address to bind to
        #[arg(short, long, default_value = "localhost")]
        ip: String,

        /// Open browser automatically
        #[arg(short, long)]
        open: bool,

        /// Render unpublished content from this preview ref
        #[arg(long)]
        preview_ref: Option<String>,
    },

    /// Render a single article page
    Render {
        /// Article uid
        uid: String,

        /// Render unpublished content from this preview ref
        #[arg(long)]
        preview_ref: Option<String>,
    },

    /// List articles, newest first
    List {
        /// Include unpublished content from this preview ref
        #[arg(long)]
        preview_ref: Option<String>,
    },

    /// Clean the public folder
    Clean,

    /// Display version information
    Version,
}

fn release(preview_ref: Option<String>) -> Option<ReleaseRef> {
    preview_ref
        .filter(|r| !r.trim().is_empty())
        .map(ReleaseRef::new)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "spacetraveling=debug,info"
    } else {
        "spacetraveling=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let fixtures = cli.fixtures;
    let load_site = || -> Result<Spacetraveling> {
        let mut site = Spacetraveling::new(&base_dir)?;
        if let Some(fixtures) = &fixtures {
            site.config.cms.fixtures = Some(fixtures.clone());
        }
        Ok(site)
    };

    match cli.command {
        Commands::Generate { preview_ref } => {
            let site = load_site()?;
            tracing::info!("Generating static files...");
            site.generate(release(preview_ref)).await?;
            println!("Generated successfully!");
        }

        Commands::Server {
            port,
            ip,
            open,
            preview_ref,
        } => {
            let site = load_site()?;
            tracing::info!("Starting server at http://{}:{}", ip, port);
            spacetraveling::server::start(&site, release(preview_ref), &ip, port, open).await?;
        }

        Commands::Render { uid, preview_ref } => {
            let site = load_site()?;
            let outcome =
                spacetraveling::commands::generate::render_one(&site, &uid, release(preview_ref))
                    .await?;
            match outcome {
                RenderOutcome::Rendered(path) => println!("Rendered {}", path.display()),
                RenderOutcome::NotFound(_) => anyhow::bail!("No article with uid {}", uid),
            }
        }

        Commands::List { preview_ref } => {
            let site = load_site()?;
            spacetraveling::commands::list::run(&site, release(preview_ref)).await?;
        }

        Commands::Clean => {
            let site = load_site()?;
            tracing::info!("Cleaning public folder...");
            site.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::Version => {
            println!("spacetraveling version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
