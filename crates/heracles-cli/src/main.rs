mod app;
mod config;

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use heracles_core::MetricChecker;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::Verdict;

#[derive(Parser)]
#[command(name = "heracles", about = "Check the metrics exposed by a Prometheus exporter")]
struct Cli {
    #[arg(short, long, env = "HERACLES_CONFIG", default_value = ".heracles.yaml")]
    config: PathBuf,

    #[arg(short, long, env = "HERACLES_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check exporter metrics
    Check(CheckArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Configuration group to check
    #[arg(short, long, env = "HERACLES_GROUP", default_value = "exporter")]
    group: String,

    /// Remove all compose images after the check
    #[arg(long, env = "HERACLES_REMOVE_ALL_IMAGES", default_value_t = false)]
    remove_all_images: bool,

    /// Write the check report as JSON to this path
    #[arg(long, env = "HERACLES_REPORT")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::from_default_env().add_directive(format!("heracles={}", cli.log_level).parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let Command::Check(args) = cli.command;
    let verdict = check(&cli.config, args).await;
    Ok(ExitCode::from(verdict.exit_code()))
}

async fn check(config_path: &std::path::Path, args: CheckArgs) -> Verdict {
    let config = match config::load_group(config_path, &args.group) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "crashed");
            return Verdict::Crashed;
        }
    };
    info!(config = %config_path.display(), group = %args.group, "checking exporter metrics");

    let components = app::assemble(&config, args.remove_all_images);
    let checker = MetricChecker::new(components.exporter, components.fixtures, config.check);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling check");
            on_signal.cancel();
        }
    });

    let result = checker.check(&cancel).await;
    let verdict = Verdict::of(&result);

    let report = match &result {
        Ok(report) => Some(report),
        Err(err) => err.report(),
    };
    if let (Some(path), Some(report)) = (args.report.as_deref(), report) {
        match app::write_report(path, report) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to write report"),
        }
    }

    match result {
        Ok(_) => info!("metrics check passed!"),
        Err(err) => match err.report() {
            Some(report) => {
                for (checker, outcome) in report.failures() {
                    error!(checker = %checker, "{}", outcome.message);
                }
                error!("metrics check failed");
            }
            None => error!(error = %err, "crashed"),
        },
    }

    verdict
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn defaults_follow_the_config_file_layout() {
        let cli = Cli::try_parse_from(["heracles", "check"]).unwrap();
        assert_eq!(cli.config.to_str(), Some(".heracles.yaml"));
        assert_eq!(cli.log_level, "info");
        let Command::Check(args) = cli.command;
        assert_eq!(args.group, "exporter");
        assert!(!args.remove_all_images);
        assert!(args.report.is_none());
    }

    #[test]
    fn flags_can_come_from_the_environment() {
        let command = Cli::command();
        command.clone().debug_assert();

        let env_of = |command: &clap::Command, id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_string)
        };
        assert_eq!(env_of(&command, "config").as_deref(), Some("HERACLES_CONFIG"));
        assert_eq!(env_of(&command, "log_level").as_deref(), Some("HERACLES_LOG_LEVEL"));

        let check = command.find_subcommand("check").unwrap();
        assert_eq!(env_of(check, "group").as_deref(), Some("HERACLES_GROUP"));
        assert_eq!(
            env_of(check, "remove_all_images").as_deref(),
            Some("HERACLES_REMOVE_ALL_IMAGES")
        );
    }
}
