//! Command-line interface definitions for press_harvest.
//!
//! All arguments can be provided as flags; credentials may also come from
//! the environment so they stay out of shell history.

use crate::config::PipelineSettings;
use crate::error::ConfigError;
use crate::pipeline::RunOptions;
use crate::scrapers::SourceOptions;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for press_harvest.
///
/// # Examples
///
/// ```sh
/// # Fetch up to 100 new articles from ZEIT ONLINE
/// PRESS_LOGIN=me@example.com PRESS_PASSWORD=secret press_harvest --profile zeit
///
/// # Refresh already stored SPIEGEL articles about a topic from the last 3 days
/// press_harvest --profile spiegel --update --spiegel-term Klima --spiegel-days 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source profile (zeit, spiegel)
    #[arg(short, long)]
    pub profile: String,

    /// Account login for the source
    #[arg(long, env = "PRESS_LOGIN")]
    pub login: Option<String>,

    /// Account password for the source
    #[arg(long = "pass", env = "PRESS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Maximum number of articles to download in this run
    #[arg(long, default_value_t = 100)]
    pub count: usize,

    /// Download already stored articles again and overwrite their rows
    #[arg(long)]
    pub update: bool,

    /// Number of concurrent fetch workers (overrides the config file)
    #[arg(long)]
    pub workers: Option<usize>,

    /// HTTP 429 answers tolerated before workers stop (overrides the config file)
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// JSON-lines file articles are stored in
    #[arg(short, long, default_value = "parser.jsonl")]
    pub store: PathBuf,

    /// Optional path to a YAML file with pipeline settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ZEIT ONLINE search mode
    #[arg(long, default_value = "")]
    pub zeit_mode: String,

    /// ZEIT ONLINE content type filter
    #[arg(long, default_value = "")]
    pub zeit_type: String,

    /// SPIEGEL search term
    #[arg(long, default_value = "")]
    pub spiegel_term: String,

    /// SPIEGEL search window in days, ending now
    #[arg(long, default_value_t = 7)]
    pub spiegel_days: u32,

    /// SPIEGEL fields the search term is matched against
    #[arg(long, default_value = "content")]
    pub spiegel_fields: String,

    /// SPIEGEL site segments to search, comma separated
    #[arg(long, default_value = "spon")]
    pub spiegel_segments: String,
}

impl Cli {
    /// Pipeline settings from the config file (or defaults) with flag overrides applied.
    pub fn settings(&self) -> Result<PipelineSettings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => PipelineSettings::from_yaml_file(path)?,
            None => PipelineSettings::default(),
        };
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(rate_limit) = self.rate_limit {
            settings.rate_limit_budget = rate_limit;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn source_options(&self, settings: &PipelineSettings) -> SourceOptions {
        SourceOptions {
            login: self.login.clone(),
            password: self.password.clone(),
            zeit_mode: self.zeit_mode.clone(),
            zeit_type: self.zeit_type.clone(),
            spiegel_term: self.spiegel_term.clone(),
            spiegel_days: self.spiegel_days,
            spiegel_fields: self.spiegel_fields.clone(),
            spiegel_segments: self.spiegel_segments.clone(),
            request_timeout: settings.request_timeout(),
            user_agent: settings.user_agent.clone(),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            item_budget: self.count,
            update: self.update,
        }
    }
}
