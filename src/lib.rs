//! spacetraveling: a blog front-end rendered from a headless CMS
//!
//! Articles are fetched from a Prismic repository (or a local fixture file)
//! and rendered to static HTML with an embedded Tera theme. The listing is
//! paginated behind a "load more" button, every article page shows an
//! estimated reading time and links to its chronological neighbors.

pub mod adjacent;
pub mod cms;
pub mod commands;
pub mod config;
pub mod content;
pub mod generator;
pub mod helpers;
pub mod listing;
pub mod server;
pub mod templates;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// The main application
#[derive(Clone)]
pub struct Spacetraveling {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: std::path::PathBuf,
    /// Source directory (static assets copied as-is)
    pub source_dir: std::path::PathBuf,
    /// Public (output) directory
    pub public_dir: std::path::PathBuf,
}

impl Spacetraveling {
    /// Create a new instance from a directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            let mut config = config::SiteConfig::default();
            config.apply_env();
            config
        };

        Ok(Self::with_config(base_dir, config))
    }

    /// Create an instance with an explicit configuration
    pub fn with_config(base_dir: std::path::PathBuf, config: config::SiteConfig) -> Self {
        let source_dir = base_dir.join(&config.source_dir);
        let public_dir = base_dir.join(&config.public_dir);

        Self {
            config,
            base_dir,
            source_dir,
            public_dir,
        }
    }

    /// The content source described by the configuration
    pub fn content_source(&self) -> Result<Arc<dyn cms::ContentSource>> {
        cms::from_config(&self.config.cms, &self.base_dir)
    }

    /// Generate the static site
    pub async fn generate(&self, release: Option<cms::ReleaseRef>) -> Result<()> {
        commands::generate::run(self, release).await
    }

    /// Clean the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}
