use std::path::PathBuf;

use clap::Parser;
use pipeline_sweeper::{
    config::{ConfigError, LogFormat, LogLevel, SweeperConfig},
    observability,
    sweeper::{HttpResourceApi, MAX_PAGE_SIZE, RetentionCutoff, SweepError, Sweeper},
};

/// CLI arguments for the pipeline sweeper
#[derive(Parser, Debug)]
#[command(version, about = "Remove old GitLab CI pipelines", long_about = None)]
struct Args {
    /// Path to a TOML config file; flags and environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The GitLab API v4 root URL
    #[arg(
        short = 'a',
        long,
        env = "CI_API_V4_URL",
        help_heading = "Required API options"
    )]
    api_root_url: Option<String>,

    /// The ID or URL-encoded path of the project
    #[arg(
        short = 'i',
        long,
        env = "CI_PROJECT_ID",
        help_heading = "Required API options"
    )]
    project_id: Option<String>,

    /// A token to authenticate with the pipelines API
    #[arg(
        short = 't',
        long,
        env = "BPROTO_CI_PRIVATE_API_TOKEN",
        hide_env_values = true,
        help_heading = "Required API options"
    )]
    token: Option<String>,

    /// Number of records to return in one request (max 100) [default: 100]
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64),
        help_heading = "Optional parameters for API calls"
    )]
    per_page: Option<u32>,

    /// Remove pipelines last updated before this time period or date [default: "1 week"]
    #[arg(long, help_heading = "Optional parameters for API calls")]
    remove_before: Option<String>,

    /// Log level (trace, debug, info, warning, error, critical)
    #[arg(long, alias = "log_level")]
    log_level: Option<LogLevel>,

    /// Log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    /// Overlay flags and environment variables on top of file configuration.
    fn apply_to(&self, config: &mut SweeperConfig) {
        if let Some(url) = &self.api_root_url {
            config.api.root_url = url.clone();
        }
        if let Some(project) = &self.project_id {
            config.api.project_id = Some(project.clone());
        }
        if let Some(token) = &self.token {
            config.api.token = Some(token.clone());
        }
        if let Some(per_page) = self.per_page {
            config.retention.per_page = per_page;
        }
        if let Some(remove_before) = &self.remove_before {
            config.retention.remove_before = remove_before.clone();
        }
        if let Some(level) = self.log_level {
            config.observability.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.logging.format = format;
        }
    }
}

fn load_config(args: &Args) -> Result<SweeperConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => SweeperConfig::from_file(path)?,
        None => SweeperConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate_for_sweep()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let code = match run_sweep(&config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline sweep failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Resolve the cutoff, build the client, and sweep the project's pipelines.
async fn run_sweep(config: &SweeperConfig) -> Result<(), SweepError> {
    let url = config
        .api
        .pipelines_url()
        .map_err(|e| SweepError::InvalidArgument(e.to_string()))?;
    let token = config
        .token()
        .ok_or_else(|| SweepError::InvalidArgument("api.token is required".to_string()))?;

    let cutoff = RetentionCutoff::resolve(Some(&config.retention.remove_before))?;
    let api = HttpResourceApi::new(&url, token)?;
    let sweeper = Sweeper::new(api, config.retention.per_page, cutoff)?.with_span(
        tracing::info_span!(
            "sweep",
            project = config.api.project_id.as_deref().unwrap_or_default(),
            updated_before = %cutoff
        ),
    );

    tracing::info!(
        url = %url,
        per_page = config.retention.per_page,
        remove_before = %config.retention.remove_before,
        updated_before = %cutoff,
        "Removing finished pipelines"
    );

    let summary = sweeper.run().await?;
    tracing::info!(
        deleted = summary.deleted.len(),
        failed = summary.failed.len(),
        "Pipeline sweep complete"
    );
    Ok(())
}
