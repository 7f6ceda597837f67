//! lockstep - send JSON requests line by line and print the replies.
//!
//! Each line read from stdin is sent as one request to the remote address.
//! Each reply is printed on its own line; a request without a reply in time
//! prints `timed out`.
//!
//! ```bash
//! echo '{"op":"ping"}' | lockstep --pretty-print tcp://127.0.0.1:5555
//! ```
//!
//! Exit status: 0 at end of input, 1 on a setup or request failure, 2 when a
//! request times out under `--exit-on-timeout`.

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockstep_client::config::{ClientConfig, TimeoutPolicy, ADDRESS_ENV, TIMEOUT_ENV};
use lockstep_client::session::{run_session, SessionEnd, SessionOptions};
use lockstep_client::BlockingClient;

#[derive(FromArgs)]
/// Send each line of stdin as a request and print each reply.
struct Args {
    /// pretty-print JSON replies
    #[argh(switch)]
    pretty_print: bool,

    /// request timeout in milliseconds (default 3000, or LOCKSTEP_TIMEOUT_MS)
    #[argh(option)]
    timeout_ms: Option<u64>,

    /// stop at the first timed-out request instead of continuing
    #[argh(switch)]
    exit_on_timeout: bool,

    /// remote address, e.g. tcp://127.0.0.1:5555 or ipc:///run/app.sock
    /// (default: LOCKSTEP_ADDRESS)
    #[argh(positional)]
    address: Option<String>,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    // Logs go to stderr so stdout carries only replies.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lockstep=warn,lockstep_client=warn".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    match run(args) {
        Ok(end) => {
            tracing::debug!(?end, "session finished");
            ExitCode::from(end.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<SessionEnd> {
    let config = ClientConfig::from_env_or(args.address, args.timeout_ms).with_context(|| {
        format!("Invalid configuration (see {} and {})", ADDRESS_ENV, TIMEOUT_ENV)
    })?;

    let mut client = BlockingClient::new().context("Failed to create client (probably out of resources)")?;
    client
        .initialize(&config.address, config.timeout)
        .with_context(|| format!("Failed to initialize client for {}", config.address))?;

    tracing::info!(
        address = %config.address,
        timeout_ms = config.timeout.as_millis() as u64,
        "client ready"
    );

    let options = SessionOptions {
        pretty_print: args.pretty_print,
        on_timeout: if args.exit_on_timeout {
            TimeoutPolicy::Exit
        } else {
            TimeoutPolicy::Continue
        },
    };

    let end = run_session(
        &mut client,
        io::stdin().lock(),
        io::stdout().lock(),
        io::stderr().lock(),
        options,
    )?;

    client.close();
    Ok(end)
}
