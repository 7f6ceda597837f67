//! Line-oriented request loop.
//!
//! Reads `\n`-delimited payloads, sends each one as a request, and writes one
//! output line per request: the reply, or `timed out`. Payloads are raw bytes;
//! only the trailing `\n` is stripped.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::client::{BlockingClient, ClientError};
use crate::config::TimeoutPolicy;
use crate::format::pretty_json;

/// Something that answers one request at a time.
///
/// Implemented by [`BlockingClient`]; exists so the loop can be driven by a
/// test double.
pub trait Requester {
    fn request(&mut self, payload: &[u8]) -> Result<&[u8], ClientError>;
    fn last_error(&self) -> &str;
}

impl Requester for BlockingClient {
    fn request(&mut self, payload: &[u8]) -> Result<&[u8], ClientError> {
        BlockingClient::request(self, payload)
    }

    fn last_error(&self) -> &str {
        BlockingClient::last_error(self)
    }
}

/// Output options for [`run_session`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub pretty_print: bool,
    pub on_timeout: TimeoutPolicy,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Input exhausted.
    EndOfInput,
    /// A request timed out under [`TimeoutPolicy::Exit`].
    TimedOut,
    /// A request failed for a reason other than a timeout.
    RequestFailed(String),
}

impl SessionEnd {
    /// Process exit code: 0 at end of input, 1 on failure, 2 on a fatal timeout.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::EndOfInput => 0,
            SessionEnd::RequestFailed(_) => 1,
            SessionEnd::TimedOut => 2,
        }
    }
}

/// Run requests for every line of `input` until it ends or a request fails.
///
/// Replies and timeout markers go to `output`, flushed per line. Request
/// failures are reported on `errors`.
///
/// # Errors
///
/// Only I/O errors on `input`, `output` or `errors` are returned as `Err`.
pub fn run_session<C, R, W, E>(
    client: &mut C,
    input: R,
    mut output: W,
    mut errors: E,
    options: SessionOptions,
) -> Result<SessionEnd>
where
    C: Requester + ?Sized,
    R: BufRead,
    W: Write,
    E: Write,
{
    for line in input.split(b'\n') {
        let payload = line.context("Failed to read input")?;

        match client.request(&payload) {
            Ok(reply) => {
                if options.pretty_print {
                    output.write_all(&pretty_json(reply))?;
                } else {
                    output.write_all(reply)?;
                }
                output.write_all(b"\n")?;
            }
            Err(e) if e.is_timeout() => {
                output.write_all(b"timed out\n")?;
                if options.on_timeout == TimeoutPolicy::Exit {
                    output.flush()?;
                    return Ok(SessionEnd::TimedOut);
                }
            }
            Err(_) => {
                output.flush()?;
                let message = client.last_error().to_string();
                writeln!(errors, "request failed: {}", message)?;
                return Ok(SessionEnd::RequestFailed(message));
            }
        }

        output.flush().context("Failed to flush output")?;
    }

    Ok(SessionEnd::EndOfInput)
}
