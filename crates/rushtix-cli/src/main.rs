//! Ticket-grab runner: load the run config, hold for the on-sale deadline,
//! then drive the workflow with bounded whole-session retry.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./config.json against the Appium server it names
//! rushtix
//!
//! # Explicit config path and a larger retry budget
//! rushtix --config grab.json --max-retries 5
//!
//! # Arm 30 seconds before the on-sale instant instead of 20
//! rushtix --lead-secs 30
//! ```
//!
//! Exit status: 0 when an attempt succeeds, 1 on invalid config or when all
//! retries are exhausted.

mod remote;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rushtix_core::config::{RunConfig, Timings};
use rushtix_core::deadline::DeadlineSynchronizer;
use rushtix_core::flow::{APP_ACTIVITY, APP_PACKAGE};
use rushtix_core::retry::SessionRetryController;
use rushtix_core::session::SessionConfig;

use remote::AppiumFactory;

/// Ticket-grabbing automation runner over an Appium UiAutomator2 server.
#[derive(Parser)]
#[command(name = "rushtix")]
#[command(about = "Time-critical ticket grabbing against a remote Android UI")]
#[command(version)]
struct Args {
    /// Path to the run config JSON
    #[arg(short, long, default_value = "config.json", env = "RUSHTIX_CONFIG")]
    config: PathBuf,

    /// Maximum full-session attempts
    #[arg(long, default_value_t = 3)]
    max_retries: usize,

    /// Seconds before the deadline to arm the session
    #[arg(long, default_value_t = 20)]
    lead_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUSHTIX_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match RunConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "config rejected");
            return ExitCode::FAILURE;
        }
    };
    info!(
        keyword = %config.keyword,
        city = %config.city,
        date = %config.date,
        deadline = %config.time,
        attendees = config.users.len(),
        commit = config.if_commit_order,
        "config loaded"
    );

    let timings = Timings::default();

    // Hold here until shortly before the on-sale instant, so the session and
    // app navigation are fresh when the purchase stages fire.
    let deadline = match config.deadline() {
        Ok(deadline) => deadline,
        Err(e) => {
            error!(error = %e, "config rejected");
            return ExitCode::FAILURE;
        }
    };
    DeadlineSynchronizer::system(timings.poll_interval)
        .wait_until(deadline, Duration::from_secs(args.lead_secs))
        .await;

    let session_config = SessionConfig {
        server_url: config.server_url.clone(),
        app_package: APP_PACKAGE.to_string(),
        app_activity: APP_ACTIVITY.to_string(),
    };

    let controller = SessionRetryController::new(
        Box::new(AppiumFactory::new()),
        session_config,
        config,
        timings,
    )
    .with_max_retries(args.max_retries);

    match controller.run().await {
        Ok(report) => {
            info!(
                attendees = report.attendees_selected.len(),
                submitted = report.submitted,
                "grab run succeeded"
            );
            println!(
                "success: {} attendee(s) selected{}",
                report.attendees_selected.len(),
                if report.submitted { ", order submitted" } else { " (dry run)" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "grab run failed");
            println!("failure: {e}");
            ExitCode::FAILURE
        }
    }
}
