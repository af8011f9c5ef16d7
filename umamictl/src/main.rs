#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::Value;
use std::process;
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use umami::types::Dimension;
use umami::{Credentials, Error as UmamiError, TimeWindowResolver, UmamiApi, UmamiClient};
use umamiconfig::UmamiConfig;
mod render;

#[derive(Parser)]
#[command(name = "umamictl", about = "A CLI for Umami analytics")]
struct Cli {
    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,
    /// Log requests to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Copy, Debug, Default)]
struct Lookback {
    /// Number of days to look back (default: `default_days_back` from config)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    days: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show summary statistics (pageviews, visitors, bounces, ...)
    Stats {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show page metrics, or a breakdown by any metric type
    Metrics {
        /// Metric type, e.g. path, url, title, language
        #[arg(short = 't', long = "type", default_value = "path")]
        metric_type: String,
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show top referrers
    Referrers {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show browsers
    Browsers {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show operating systems
    Os {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show device types
    Devices {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show visitor countries
    Countries {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show custom events
    Events {
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show pageviews and sessions over time
    Pageviews {
        /// Bucket size: year, month, day or hour
        #[arg(short, long, default_value = "day")]
        unit: String,
        /// Timezone used for bucketing, e.g. Europe/Paris
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[command(flatten)]
        lookback: Lookback,
    },
    /// Show visitors active right now
    Active,
    /// Print the location of the config file
    ConfigPath,
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

impl Command {
    fn dimension(&self) -> Option<(Dimension, Lookback)> {
        match *self {
            Self::Referrers { lookback } => Some((Dimension::Referrer, lookback)),
            Self::Browsers { lookback } => Some((Dimension::Browser, lookback)),
            Self::Os { lookback } => Some((Dimension::Os, lookback)),
            Self::Devices { lookback } => Some((Dimension::Device, lookback)),
            Self::Countries { lookback } => Some((Dimension::Country, lookback)),
            Self::Events { lookback } => Some((Dimension::Event, lookback)),
            _ => None,
        }
    }
}

const fn dimension_title(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Referrer => "Referrers",
        Dimension::Browser => "Browsers",
        Dimension::Os => "Operating systems",
        Dimension::Device => "Devices",
        Dimension::Country => "Countries",
        Dimension::Event => "Events",
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("umami=debug,umamictl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn get_client(config: &UmamiConfig, resolver: TimeWindowResolver) -> Result<UmamiClient> {
    let password = config
        .password()
        .with_context(|| "Failed to resolve umami password")?;
    Ok(UmamiClient::new(
        &config.url,
        Credentials::new(config.username.clone(), password),
        config.website_id.clone(),
    )
    .with_default_days_back(config.default_days_back)
    .with_time_window_resolver(resolver))
}

fn format_umami_error(err: &UmamiError) -> String {
    match err {
        UmamiError::Api {
            status: 401 | 403, ..
        } => format!(
            "{err}\nThe server rejected the session token; check the account's access to this website."
        ),
        UmamiError::Api { .. } => err.to_string(),
        UmamiError::Http(source) if source.is_connect() || source.is_timeout() => {
            format!("Could not reach the Umami server: {source}")
        }
        UmamiError::Http(source)
            if source.status().is_some_and(|status| status.as_u16() == 401) =>
        {
            "Umami login failed: check `username` and `password` in the umami config.".to_string()
        }
        UmamiError::Http(_) => err.to_string(),
    }
}

fn handle_error(err: &anyhow::Error) -> ! {
    if let Some(umami_err) = err.downcast_ref::<UmamiError>() {
        eprintln!("{}", format_umami_error(umami_err));
        process::exit(1);
    }

    eprintln!("{err:#}");
    process::exit(1);
}

/// Renders a response, or dumps it verbatim with `--json`.
fn output(value: &Value, json: bool, render: fn(&Value) -> String) -> String {
    if json {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        render(value)
    }
}

/// Runs a query command against `client` and returns what to print.
///
/// `resolver` must be the one `client` resolves its windows with, so the
/// header shows the bounds that were actually queried.
async fn query(
    client: &impl UmamiApi,
    command: &Command,
    default_days: u32,
    resolver: TimeWindowResolver,
    json: bool,
) -> Result<String> {
    let with_header = |title: &str, days: u32, body: String| {
        if json {
            return body;
        }
        let window = resolver.resolve(days);
        format!("{}\n{body}", render::window_header(title, days, window))
    };

    if let Some((dimension, lookback)) = command.dimension() {
        let value = client.get_dimension(dimension, lookback.days).await?;
        let days = lookback.days.unwrap_or(default_days);
        let body = output(&value, json, render::metrics);
        return Ok(with_header(dimension_title(dimension), days, body));
    }

    let text = match command {
        Command::Stats { lookback } => {
            let value = client.get_stats(lookback.days).await?;
            let days = lookback.days.unwrap_or(default_days);
            with_header("Stats", days, output(&value, json, render::stats))
        }
        Command::Metrics {
            metric_type,
            lookback,
        } => {
            let value = client
                .get_page_metrics(lookback.days, Some(metric_type.as_str()))
                .await?;
            let days = lookback.days.unwrap_or(default_days);
            let title = format!("Metrics by {metric_type}");
            with_header(&title, days, output(&value, json, render::metrics))
        }
        Command::Pageviews {
            unit,
            timezone,
            lookback,
        } => {
            let value = client
                .get_page_views(Some(unit.as_str()), Some(timezone.as_str()), lookback.days)
                .await?;
            let days = lookback.days.unwrap_or(default_days);
            with_header("Pageviews", days, output(&value, json, render::page_views))
        }
        Command::Active => {
            let value = client.get_active_users().await?;
            output(&value, json, render::active)
        }
        other => anyhow::bail!("not a query command: {other:?}"),
    };
    Ok(text)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        handle_error(&err);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "umamictl", &mut std::io::stdout());
        }
        Command::ConfigPath => {
            let path = UmamiConfig::path().with_context(|| "Failed to locate umami config")?;
            println!("{}", path.display());
        }
        ref command => {
            let config = UmamiConfig::load().with_context(|| "Failed to load umami config")?;
            let resolver = TimeWindowResolver::anchored_at(OffsetDateTime::now_utc());
            let client = get_client(&config, resolver)?;
            debug!(website_id = client.website_id(), "querying umami");
            let days = config.default_days_back;
            let text = query(&client, command, days, resolver, cli.json).await?;
            println!("{text}");
        }
    }

    Ok(())
}
