//! runbound - run one program as a given user for a bounded time
//!
//! ```text
//! runbound <username> <password> <timeoutMillis> <executablePath> [<argumentString>]
//! ```
//!
//! The child's stdout and stderr are forwarded to ours, our stdin is
//! forwarded to the child line by line, and the child is killed once the
//! time-out elapses. runbound always exits with status 0; problems are
//! reported as a single `runbound: ...` line on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use runbound_api::Invocation;
use runbound_core::{Console, SupervisorConfig, run};
use runbound_host_linux::LinuxHost;
use runbound_util::{RunboundError, duration_millis};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DIAGNOSTIC_PREFIX: &str = "runbound";

/// runbound - run a program as another user with a hard time-out
#[derive(Parser, Debug)]
#[command(name = "runbound")]
#[command(about = "Run a program as another user with a hard time-out", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Log filter, e.g. "info" or "runbound_core=debug" (or set RUNBOUND_LOG)
    #[arg(long, env = "RUNBOUND_LOG", default_value = "warn", hide = true)]
    log_level: String,

    /// Milliseconds between liveness checks (or set RUNBOUND_POLL_INTERVAL_MS)
    #[arg(
        long,
        env = "RUNBOUND_POLL_INTERVAL_MS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        hide = true
    )]
    poll_interval_ms: u64,

    /// Milliseconds to wait for output to drain at shutdown (or set RUNBOUND_DRAIN_TIMEOUT_MS)
    #[arg(long, env = "RUNBOUND_DRAIN_TIMEOUT_MS", default_value_t = 1000, hide = true)]
    drain_timeout_ms: u64,

    /// <username> <password> <timeoutMillis> <executablePath> [<argumentString>]
    #[arg(
        value_name = "ARGS",
        num_args = 0..,
        allow_hyphen_values = true,
        trailing_var_arg = true
    )]
    positional: Vec<String>,
}

impl Args {
    fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}

fn main() {
    let args = match parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            report(&err.into());
            exit_now();
        }
    };

    init_logging(&args.log_level);

    if let Err(err) = execute(args) {
        report(&err);
    }

    exit_now();
}

/// The surface is purely positional: any clap error, including what would
/// otherwise be a help or version request, is a usage error.
fn parse_args<I, T>(argv: I) -> std::result::Result<Args, RunboundError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|_| RunboundError::InvalidArguments)
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(args: Args) -> Result<()> {
    let config = args.supervisor_config();
    let invocation = Invocation::from_args(args.positional)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        user = %invocation.spec.username(),
        executable = %invocation.spec.executable().display(),
        timeout_ms = duration_millis(invocation.spec.timeout()),
        "runbound starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    // A panic on the main path must still end in one diagnostic line and a
    // clean exit, so it is caught here while the runtime is still ours.
    let host = LinuxHost::new();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(run(&host, invocation, &config, Console::process()))
    }));

    // The input relay may still be parked in a console read that cannot be
    // interrupted; dropping the runtime would wait for it forever.
    runtime.shutdown_background();

    match result {
        Ok(outcome) => {
            outcome?;
            Ok(())
        }
        Err(payload) => Err(RunboundError::internal(panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// The single line printed for a failed run
fn diagnostic(err: &anyhow::Error) -> String {
    match err.downcast_ref::<RunboundError>() {
        Some(e) if e.is_usage() => format!("{}: {}", DIAGNOSTIC_PREFIX, e),
        Some(e) => format!(
            "{}: exception '{}' occurred ~ '{}'.",
            DIAGNOSTIC_PREFIX,
            e.category(),
            e
        ),
        None => format!(
            "{}: exception 'InternalError' occurred ~ '{:#}'.",
            DIAGNOSTIC_PREFIX, err
        ),
    }
}

fn report(err: &anyhow::Error) {
    debug!(error = %format!("{:#}", err), "Run failed");
    println!("{}", diagnostic(err));
}

/// Exit immediately, without waiting on the console input reader
fn exit_now() -> ! {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(values: &[&str]) -> std::result::Result<Args, RunboundError> {
        parse_args(std::iter::once("runbound").chain(values.iter().copied()))
    }

    #[test]
    fn positional_values_keep_hyphens() {
        let args = parse(&["alice", "--not-a-flag", "100", "/bin/echo", "-n hi"]).unwrap();
        assert_eq!(
            args.positional,
            vec!["alice", "--not-a-flag", "100", "/bin/echo", "-n hi"]
        );
    }

    #[test]
    fn config_defaults() {
        let args = parse(&["u", "p", "1", "/bin/true"]).unwrap();
        let config = args.supervisor_config();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        assert!(parse(&["--poll-interval-ms", "0", "u", "p", "1", "/bin/true"]).is_err());
    }

    #[test]
    fn help_and_version_are_usage_errors() {
        for flag in ["-h", "--help", "-V", "--version"] {
            let err = match parse(&[flag]) {
                Err(e) => e,
                Ok(args) => Invocation::from_args(args.positional).unwrap_err(),
            };
            assert!(matches!(err, RunboundError::InvalidArguments), "flag {}", flag);
        }
    }

    #[test]
    fn panic_payloads() {
        let static_str: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(static_str.as_ref()), "static");

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
    }

    #[test]
    fn diagnostics() {
        let usage = anyhow::Error::from(RunboundError::InvalidArguments);
        assert_eq!(diagnostic(&usage), "runbound: invalid arguments.");

        let timeout = anyhow::Error::from(RunboundError::InvalidTimeout);
        assert_eq!(diagnostic(&timeout), "runbound: invalid time-out period.");

        let launch = anyhow::Error::from(RunboundError::launch("Failed to spawn /x: not found"));
        assert_eq!(
            diagnostic(&launch),
            "runbound: exception 'LaunchError' occurred ~ 'Launch failed: Failed to spawn /x: not found'."
        );

        let other = anyhow::anyhow!("boom").context("Failed to start async runtime");
        assert_eq!(
            diagnostic(&other),
            "runbound: exception 'InternalError' occurred ~ 'Failed to start async runtime: boom'."
        );
    }
}
