mod logging;

use clap::Parser;
use csv_adapter::CsvTableStore;
use http_adapter::{FetchConfig, HttpUserSource, DEFAULT_ENDPOINT, DEFAULT_REFERER, DEFAULT_USER_AGENT};
use presence_core::application::{PresenceLogService, RunOutcome};
use presence_core::ports::{TableStore, UserSource};
use std::path::PathBuf;

/// CLI tool that records which users are currently online into a CSV presence log
#[derive(Parser, Debug)]
#[command(name = "presence-log")]
#[command(about = "Fetches the list of online users and appends a timestamped presence row to a CSV log")]
#[command(version)]
struct Cli {
    /// Path of the CSV presence log, created on first run
    #[arg(short = 'o', long = "output", env = "PRESENCE_LOG_FILE", default_value = "user_log.csv")]
    output: PathBuf,

    /// URL returning the JSON array of online users
    #[arg(long, env = "PRESENCE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Referer header sent with the request
    #[arg(long, default_value = DEFAULT_REFERER)]
    referer: String,

    /// User-Agent header sent with the request
    #[arg(long = "user-agent", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Authentication cookie, sent first in the Cookie header
    #[arg(long = "auth-cookie", env = "AUTH_COOKIE", default_value = "", hide_env_values = true)]
    auth_cookie: String,

    /// Session cookie, sent second in the Cookie header
    #[arg(long = "sess-cookie", env = "SESS_COOKIE", default_value = "", hide_env_values = true)]
    sess_cookie: String,

    /// Append an all-zero row when nobody is online instead of skipping the run
    #[arg(long = "record-empty")]
    record_empty: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            auth_cookie: self.auth_cookie.clone(),
            sess_cookie: self.sess_cookie.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    // Instantiate concrete implementations of secondary adapters
    let user_source: Box<dyn UserSource> = match HttpUserSource::new(cli.fetch_config()) {
        Ok(source) => Box::new(source),
        Err(e) => {
            // A client that cannot be built is a failed fetch: skip this data point
            tracing::error!("Error fetching data: {}", e);
            println!("No users fetched.");
            return;
        }
    };

    let table_store: Box<dyn TableStore> = Box::new(CsvTableStore::new(cli.output.clone()));

    let service = PresenceLogService::new(user_source, table_store)
        .with_record_empty(cli.record_empty);

    match service.run() {
        Ok(RunOutcome::Logged(summary)) => {
            println!(
                "[{}] Updated CSV with {} users.",
                summary.timestamp, summary.usernames
            );
            println!(
                "Successfully logged {} users ({} rows in {}).",
                summary.usernames,
                summary.row_count,
                cli.output.display()
            );
        }
        Ok(RunOutcome::Skipped) => {
            println!("No users fetched.");
        }
        Err(e) => {
            eprintln!("Error updating {}: {}", cli.output.display(), e);
            std::process::exit(1);
        }
    }
}
