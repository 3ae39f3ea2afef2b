use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::{control::SleepInhibitor, error::ControlError};

/// How long a freshly spawned inhibitor must survive before we trust it.
const STARTUP_GRACE: Duration = Duration::from_millis(250);

const REASON: &str = "heater controller is running";

/// Holds an OS sleep inhibitor alive for as long as a child process runs.
pub struct SystemInhibitor {
    command: Option<InhibitCommand>,
}

struct InhibitCommand {
    program: String,
    args: Vec<String>,
}

pub struct InhibitGuard {
    child: Child,
    program: String,
}

impl SystemInhibitor {
    /// Uses the platform's inhibitor, if it has one.
    pub fn new() -> Self {
        match platform_command(REASON) {
            Some((program, args)) => Self::with_command(program, args),
            None => Self { command: None },
        }
    }

    /// Runs `program` with `args` as the inhibitor. The process must keep
    /// running until it is killed.
    pub fn with_command<A>(program: impl Into<String>, args: A) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            command: Some(InhibitCommand {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            }),
        }
    }
}

impl Default for SystemInhibitor {
    fn default() -> Self {
        Self::new()
    }
}

impl InhibitGuard {
    /// Kills the inhibitor and waits for it to exit.
    async fn stop(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

#[cfg(target_os = "linux")]
fn platform_command(reason: &str) -> Option<(&'static str, Vec<String>)> {
    let args = vec![
        "--what=sleep:idle".to_string(),
        "--who=heater-controller".to_string(),
        "--mode=block".to_string(),
        format!("--why={reason}"),
        "sleep".to_string(),
        "infinity".to_string(),
    ];
    Some(("systemd-inhibit", args))
}

#[cfg(target_os = "macos")]
fn platform_command(_reason: &str) -> Option<(&'static str, Vec<String>)> {
    Some(("caffeinate", vec!["-i".to_string()]))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_command(_reason: &str) -> Option<(&'static str, Vec<String>)> {
    None
}

#[async_trait]
impl SleepInhibitor for SystemInhibitor {
    type Guard = InhibitGuard;

    async fn inhibit(&self) -> Result<InhibitGuard, ControlError> {
        let Some(InhibitCommand { program, args }) = &self.command else {
            return Err(ControlError::Inhibit(
                "sleep inhibition is not supported on this platform".into(),
            ));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ControlError::Inhibit(format!("failed to spawn {program}: {err}").into()))?;

        tokio::time::sleep(STARTUP_GRACE).await;
        match child.try_wait() {
            Ok(None) => {
                debug!(program, pid = child.id(), "sleep inhibitor running");
                Ok(InhibitGuard {
                    child,
                    program: program.clone(),
                })
            }
            Ok(Some(status)) => Err(ControlError::Inhibit(
                format!("{program} exited immediately with {status}").into(),
            )),
            Err(err) => Err(ControlError::Inhibit(err.into())),
        }
    }

    async fn release(&self, mut guard: InhibitGuard) {
        if let Err(err) = guard.stop().await {
            warn!(program = guard.program.as_str(), "failed to stop sleep inhibitor: {err}");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_inhibit_error() {
        let inhibitor = SystemInhibitor::with_command("heater-controller-no-such-inhibitor", ["-x"]);

        let err = inhibitor.inhibit().await.err().unwrap();

        assert!(matches!(err, ControlError::Inhibit(_)), "{err:?}");
        assert!(err.report().contains("failed to spawn"), "{}", err.report());
    }

    #[tokio::test]
    async fn program_that_exits_at_once_is_an_inhibit_error() {
        let inhibitor = SystemInhibitor::with_command("false", Vec::<String>::new());

        let err = inhibitor.inhibit().await.err().unwrap();

        assert!(matches!(err, ControlError::Inhibit(_)), "{err:?}");
        assert!(err.report().contains("exited immediately"), "{}", err.report());
    }

    #[tokio::test]
    async fn stop_kills_and_reaps_running_inhibitor() {
        let inhibitor = SystemInhibitor::with_command("sleep", ["30"]);

        let mut guard = inhibitor.inhibit().await.unwrap();
        assert!(guard.child.id().is_some());

        guard.stop().await.unwrap();

        assert!(guard.child.id().is_none());
        assert!(guard.child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn release_reaps_running_inhibitor() {
        let inhibitor = SystemInhibitor::with_command("sleep", ["30"]);

        let guard = inhibitor.inhibit().await.unwrap();
        let _pid = guard.child.id().unwrap();
        inhibitor.release(guard).await;

        #[cfg(target_os = "linux")]
        assert!(!std::path::Path::new(&format!("/proc/{_pid}")).exists());
    }
}
