//! External command execution.
//!
//! Every network-configuration step is an external program run through a
//! [`CommandRunner`]. Runners never fail: launch errors, non-zero exits and
//! timeouts all collapse into a [`CommandResult`] with `success == false`.

use log::{debug, info};
#[cfg(feature = "mock")]
use mockall::automock;
use std::{fmt, process::Stdio, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    time::timeout,
};
use trait_variant::make;

/// Default upper bound for a single external command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TIMEOUT_MESSAGE: &str = "timeout exceeded";
const UNSUPPORTED_MESSAGE: &str = "platform not supported";
const MASK: &str = "***";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Arg {
    Plain(String),
    Secret(String),
}

impl Arg {
    fn value(&self) -> &str {
        match self {
            Arg::Plain(value) | Arg::Secret(value) => value,
        }
    }
}

/// A program plus its argument vector.
///
/// Arguments are handed to the process launcher as-is; nothing is ever
/// interpreted by a shell. Secret arguments are masked when displayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Plain(arg.into())));
        self
    }

    /// Append an argument that must never show up in logs
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Secret(arg.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Raw arguments as passed to the process, secrets included
    pub fn arg_values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(Arg::value)
    }

    /// Program followed by raw arguments, secrets included
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.arg_values())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(value) => write!(f, " {value}")?,
                Arg::Secret(_) => write!(f, " {MASK}")?,
            }
        }
        Ok(())
    }
}

/// Whether commands get an elevation prefix
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Privilege {
    #[default]
    User,
    Sudo,
}

impl Privilege {
    /// Start a command line for `program`, prefixed with `sudo` if required
    pub fn command(self, program: &str) -> CommandLine {
        match self {
            Privilege::User => CommandLine::new(program),
            Privilege::Sudo => CommandLine::new("sudo").arg(program),
        }
    }
}

/// Why a command (or a supervised service) did not succeed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// command exceeded its bound and was killed
    Timeout,
    /// process could not be started
    LaunchFailure,
    /// process ran and exited with a code other than 0
    NonZeroExit,
    /// no process was attempted on this platform
    PlatformUnsupported,
    /// daemon was launched but never showed up in the process table
    ServiceUnverified,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::LaunchFailure => "launch failure",
            FailureKind::NonZeroExit => "non-zero exit",
            FailureKind::PlatformUnsupported => "platform unsupported",
            FailureKind::ServiceUnverified => "service unverified",
        };
        f.write_str(text)
    }
}

/// Outcome of exactly one command invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub failure: Option<FailureKind>,
}

impl CommandResult {
    /// Result of a process that ran to completion
    pub fn completed(exit_code: i32, stdout: String, stderr: String) -> Self {
        let success = exit_code == 0;
        Self {
            success,
            stdout,
            stderr,
            exit_code,
            failure: (!success).then_some(FailureKind::NonZeroExit),
        }
    }

    /// Synthesized result for a command that did not run to completion
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            failure: Some(kind),
        }
    }

    /// Short description of what went wrong, empty on success
    pub fn error_text(&self) -> String {
        match self.failure {
            None => String::new(),
            Some(FailureKind::NonZeroExit) if self.stderr.trim().is_empty() => {
                format!("exit code {}", self.exit_code)
            }
            Some(kind) => format!("{kind}: {}", self.stderr.trim()),
        }
    }
}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait CommandRunner {
    /// Checked on every call; never cached
    fn is_supported(&self) -> bool;
    async fn run(&self, command: &CommandLine, limit: Duration) -> CommandResult;
}

type PlatformCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// [`CommandRunner`] backed by real child processes
#[derive(Clone)]
pub struct ProcessRunner {
    platform_supported: PlatformCheck,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::with_platform_check(|| cfg!(target_os = "linux"))
    }

    pub fn with_platform_check(check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            platform_supported: Arc::new(check),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ProcessRunner {
    fn is_supported(&self) -> bool {
        (self.platform_supported)()
    }

    async fn run(&self, command: &CommandLine, limit: Duration) -> CommandResult {
        if !self.is_supported() {
            debug!("skip {command}: {UNSUPPORTED_MESSAGE}");
            return CommandResult::failed(FailureKind::PlatformUnsupported, UNSUPPORTED_MESSAGE);
        }

        let result = execute(command, limit).await;

        if result.success {
            info!("{command}: ok");
        } else {
            debug!("{command}: failed ({})", result.error_text());
        }

        result
    }
}

async fn execute(command: &CommandLine, limit: Duration) -> CommandResult {
    let spawned = Command::new(command.program())
        .args(command.arg_values())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            return CommandResult::failed(
                FailureKind::LaunchFailure,
                format!("failed to spawn {}: {e}", command.program()),
            );
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = timeout(limit, async {
        let (stdout, stderr) = tokio::join!(read_pipe(stdout), read_pipe(stderr));
        let status = child.wait().await;
        (stdout, stderr, status)
    })
    .await;

    match outcome {
        Ok((stdout, stderr, Ok(status))) => {
            CommandResult::completed(status.code().unwrap_or(-1), stdout, stderr)
        }
        Ok((_, _, Err(e))) => CommandResult::failed(
            FailureKind::LaunchFailure,
            format!("failed to wait for {}: {e}", command.program()),
        ),
        Err(_) => {
            if let Err(e) = child.start_kill() {
                debug!("failed to kill {}: {e}", command.program());
            }
            CommandResult::failed(FailureKind::Timeout, TIMEOUT_MESSAGE)
        }
    }
}

async fn read_pipe<P: AsyncRead + Unpin>(pipe: Option<P>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("failed to read process output: {e}");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    mod command_line {
        use super::*;

        #[test]
        fn masks_secret_arguments_when_displayed() {
            let command = CommandLine::new("nmcli")
                .args(["device", "wifi", "connect", "Home"])
                .arg("password")
                .secret_arg("hunter22");

            assert_eq!(
                command.to_string(),
                "nmcli device wifi connect Home password ***"
            );
            assert_eq!(
                command.argv(),
                vec!["nmcli", "device", "wifi", "connect", "Home", "password", "hunter22"]
            );
        }

        #[test]
        fn sudo_privilege_prefixes_program() {
            let command = Privilege::Sudo.command("nmcli").arg("device");
            assert_eq!(command.argv(), vec!["sudo", "nmcli", "device"]);

            let command = Privilege::User.command("nmcli").arg("device");
            assert_eq!(command.argv(), vec!["nmcli", "device"]);
        }
    }

    mod process_runner {
        use super::*;

        #[tokio::test]
        async fn captures_output_of_successful_command() {
            let runner = ProcessRunner::with_platform_check(|| true);
            let command = CommandLine::new("sh").args(["-c", "echo hello; echo oops >&2"]);

            let result = runner.run(&command, DEFAULT_TIMEOUT).await;

            assert!(result.success);
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.stdout.trim(), "hello");
            assert_eq!(result.stderr.trim(), "oops");
            assert_eq!(result.failure, None);
        }

        #[tokio::test]
        async fn reports_non_zero_exit() {
            let runner = ProcessRunner::with_platform_check(|| true);
            let command = CommandLine::new("sh").args(["-c", "exit 3"]);

            let result = runner.run(&command, DEFAULT_TIMEOUT).await;

            assert!(!result.success);
            assert_eq!(result.exit_code, 3);
            assert_eq!(result.failure, Some(FailureKind::NonZeroExit));
            assert_eq!(result.error_text(), "exit code 3");
        }

        #[tokio::test]
        async fn times_out_regardless_of_eventual_exit_code() {
            let runner = ProcessRunner::with_platform_check(|| true);
            let command = CommandLine::new("sh").args(["-c", "sleep 5; exit 0"]);

            let started = std::time::Instant::now();
            let result = runner.run(&command, Duration::from_millis(200)).await;

            assert!(!result.success);
            assert_eq!(result.exit_code, -1);
            assert_eq!(result.stderr, "timeout exceeded");
            assert_eq!(result.failure, Some(FailureKind::Timeout));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[tokio::test]
        async fn converts_missing_binary_into_launch_failure() {
            let runner = ProcessRunner::with_platform_check(|| true);
            let command = CommandLine::new("/nonexistent/definitely-not-a-binary");

            let result = runner.run(&command, DEFAULT_TIMEOUT).await;

            assert!(!result.success);
            assert_eq!(result.exit_code, -1);
            assert_eq!(result.failure, Some(FailureKind::LaunchFailure));
            assert!(result.stderr.contains("failed to spawn"));
        }

        #[tokio::test]
        async fn does_not_launch_on_unsupported_platform() {
            let supported = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&supported);
            let runner = ProcessRunner::with_platform_check(move || flag.load(Ordering::SeqCst));
            let command = CommandLine::new("sh").args(["-c", "exit 0"]);

            let result = runner.run(&command, DEFAULT_TIMEOUT).await;
            assert!(!result.success);
            assert_eq!(result.failure, Some(FailureKind::PlatformUnsupported));

            // the check is evaluated per call, so flipping it takes effect immediately
            supported.store(true, Ordering::SeqCst);
            let result = runner.run(&command, DEFAULT_TIMEOUT).await;
            assert!(result.success);
        }
    }
}
