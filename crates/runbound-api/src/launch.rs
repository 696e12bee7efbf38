//! Invocation parsing and the launch specification
//!
//! The command line is purely positional:
//!
//! ```text
//! <username> <password> <timeoutMillis> <executablePath> [<argumentString>]
//! ```

use runbound_util::{Result, RunboundError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

use crate::CredentialHandle;

/// Positional values without the optional argument string
pub const REQUIRED_ARGS: usize = 4;

/// Positional values including the optional argument string
pub const MAX_ARGS: usize = 5;

/// Everything needed to launch and bound one child process.
///
/// Immutable once built; the credential travels separately in [`Invocation`]
/// so the secret is never cloned along with the rest of the spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    username: String,
    timeout: Duration,
    executable: PathBuf,
    working_directory: Option<PathBuf>,
    argument_line: Option<String>,
}

impl LaunchSpec {
    pub fn new(
        username: impl Into<String>,
        timeout: Duration,
        executable: impl Into<PathBuf>,
        argument_line: Option<String>,
    ) -> Result<Self> {
        let mut executable = executable.into();
        if executable.as_os_str().is_empty() {
            return Err(RunboundError::InvalidArguments);
        }
        if timeout.is_zero() {
            return Err(RunboundError::InvalidTimeout);
        }

        // The child starts in the executable's directory, so a relative path
        // with a directory part is resolved against our own working directory
        // first. A bare name is left for the PATH search.
        if executable.is_relative() && containing_directory(&executable).is_some() {
            executable = std::path::absolute(&executable)?;
        }
        let working_directory = containing_directory(&executable);

        Ok(Self {
            username: username.into(),
            timeout,
            executable,
            working_directory,
            argument_line,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute unless the executable was given as a bare name
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Parent directory of the executable, if the path has one
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// The unescaped argument line handed to the child
    pub fn argument_line(&self) -> Option<&str> {
        self.argument_line.as_deref()
    }

    /// Argument vector for the child, excluding the program itself
    pub fn argv(&self) -> Vec<String> {
        self.argument_line
            .as_deref()
            .map(split_argument_line)
            .unwrap_or_default()
    }
}

/// A validated command line: the launch spec plus the credential it runs under
#[derive(Debug)]
pub struct Invocation {
    pub spec: LaunchSpec,
    pub credential: CredentialHandle,
}

impl Invocation {
    /// Validate positional arguments (program name already stripped).
    ///
    /// Arity is checked first, then the timeout; nothing is launched here.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args: Vec<String> = args.into_iter().collect();
        if args.len() != REQUIRED_ARGS && args.len() != MAX_ARGS {
            args.iter_mut().for_each(Zeroize::zeroize);
            return Err(RunboundError::InvalidArguments);
        }

        let argument_line = if args.len() == MAX_ARGS {
            args.pop().map(|raw| unescape_quotes(&raw))
        } else {
            None
        };
        let mut positional = args.into_iter();
        let (Some(username), Some(secret), Some(timeout), Some(executable)) = (
            positional.next(),
            positional.next(),
            positional.next(),
            positional.next(),
        ) else {
            return Err(RunboundError::InvalidArguments);
        };

        // The plaintext password is wiped here; an early return below drops
        // the handle, which zeroizes the protected copy too.
        let credential = CredentialHandle::new(username.clone(), secret);
        let timeout = parse_timeout(&timeout)?;
        let spec = LaunchSpec::new(username, timeout, executable, argument_line)?;

        Ok(Self { spec, credential })
    }
}

/// Parse a timeout in milliseconds; it must be a positive 32-bit integer.
pub fn parse_timeout(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<i32>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis as u64)),
        _ => Err(RunboundError::InvalidTimeout),
    }
}

/// Replace every `\"` with `"`. No other sequence is touched.
pub fn unescape_quotes(raw: &str) -> String {
    raw.replace("\\\"", "\"")
}

/// Split an argument line into argv without a shell.
///
/// Unquoted whitespace separates arguments. Double quotes group text
/// (including whitespace) into one argument and are themselves removed;
/// `""` yields an empty argument. Backslashes are literal.
pub fn split_argument_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if started {
        args.push(current);
    }

    args
}

fn containing_directory(executable: &Path) -> Option<PathBuf> {
    executable
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
