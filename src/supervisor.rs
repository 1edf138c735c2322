//! Process supervision.
//!
//! Two pieces live here:
//!
//! - [`ServerSupervisor`]: the `serve` unit. Runs the external server as a
//!   child process and restarts it after a cooldown whenever it crashes
//!   (non-zero exit that was not caused by a signal). On shutdown the child
//!   gets SIGTERM, then a grace period, then SIGKILL.
//! - [`run_units`]: the `run` entry point. Re-executes the current binary as
//!   `serve` and `ingest`, forwards SIGINT/SIGTERM to both, and waits for
//!   both to exit.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::config::ServerConfig;
use crate::shutdown::{Shutdown, TerminationSignals};

/// Why [`ServerSupervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    /// Shutdown was requested and the child has been stopped.
    Stopped,
    /// The child ended on its own in a way that is not restarted: a zero
    /// exit, or death by signal.
    Finished(ExitStatus),
}

#[derive(Debug, Clone)]
pub struct ServerSupervisor {
    program: String,
    args: Vec<String>,
    cooldown: Duration,
    grace: Duration,
}

impl ServerSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cooldown: Duration::from_secs(5),
            grace: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
            .with_cooldown(Duration::from_secs(config.restart_cooldown_secs))
            .with_grace(Duration::from_secs(config.shutdown_grace_secs))
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Keep the server running until `shutdown` fires or it ends cleanly.
    ///
    /// Failing to launch the program the first time is an error; later
    /// launch failures are treated like crashes and retried.
    pub async fn run(&self, shutdown: Shutdown) -> Result<ServerExit> {
        let mut launches: u32 = 0;

        loop {
            if shutdown.is_triggered() {
                return Ok(ServerExit::Stopped);
            }

            let spawned = Command::new(&self.program)
                .args(&self.args)
                .kill_on_drop(true)
                .spawn();
            launches += 1;

            let mut child = match spawned {
                Ok(child) => child,
                Err(e) if launches == 1 => {
                    return Err(e).with_context(|| format!("cannot start '{}'", self.program));
                }
                Err(e) => {
                    tracing::error!(program = %self.program, error = %e, "server relaunch failed");
                    if !self.cool_down(&shutdown).await {
                        return Ok(ServerExit::Stopped);
                    }
                    continue;
                }
            };
            tracing::info!(
                program = %self.program,
                pid = child.id().unwrap_or_default(),
                launch = launches,
                "server started"
            );

            tokio::select! {
                status = child.wait() => {
                    let status = status.context("cannot wait for server process")?;
                    if status.success() {
                        tracing::info!("server exited cleanly");
                        return Ok(ServerExit::Finished(status));
                    }
                    if let Some(signal) = exit_signal(&status) {
                        tracing::warn!(signal, "server killed by signal, not restarting");
                        return Ok(ServerExit::Finished(status));
                    }
                    tracing::warn!(
                        code = status.code().unwrap_or(-1),
                        cooldown_secs = self.cooldown.as_secs(),
                        "server crashed, restarting"
                    );
                }
                _ = shutdown.wait() => {
                    self.stop(&mut child).await?;
                    return Ok(ServerExit::Stopped);
                }
            }

            if !self.cool_down(&shutdown).await {
                return Ok(ServerExit::Stopped);
            }
        }
    }

    /// Sleep for the cooldown. Returns false if shutdown cut it short.
    async fn cool_down(&self, shutdown: &Shutdown) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.cooldown) => true,
            _ = shutdown.wait() => false,
        }
    }

    async fn stop(&self, child: &mut Child) -> Result<()> {
        tracing::info!(grace_secs = self.grace.as_secs(), "stopping server");
        if let Err(e) = terminate(child) {
            tracing::warn!(error = %e, "cannot signal server");
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(status) => {
                let status = status.context("cannot wait for server process")?;
                tracing::info!(%status, "server stopped");
            }
            Err(_) => {
                tracing::warn!("server ignored SIGTERM, killing");
                child.kill().await.context("cannot kill server process")?;
            }
        }
        Ok(())
    }
}

/// Spawn `serve` and `ingest` from the current executable and wait for both.
///
/// Returns true when both units exited successfully.
pub async fn run_units(config_path: &Path, env_file: Option<&Path>) -> Result<bool> {
    let exe = std::env::current_exe().context("cannot locate current executable")?;
    let spawn_unit = |unit: &str| -> Result<Child> {
        let mut cmd = Command::new(&exe);
        cmd.arg("--config").arg(config_path);
        if let Some(env_file) = env_file {
            cmd.arg("--env-file").arg(env_file);
        }
        cmd.arg(unit)
            .spawn()
            .with_context(|| format!("cannot start {} unit", unit))
    };

    let mut signals = TerminationSignals::register()?;
    let mut server = spawn_unit("serve")?;
    let mut ingest = match spawn_unit("ingest") {
        Ok(child) => child,
        Err(e) => {
            let _ = terminate(&mut server);
            let _ = server.wait().await;
            return Err(e);
        }
    };
    tracing::info!(
        serve_pid = server.id().unwrap_or_default(),
        ingest_pid = ingest.id().unwrap_or_default(),
        "units started"
    );

    let mut server_status: Option<ExitStatus> = None;
    let mut ingest_status: Option<ExitStatus> = None;

    while server_status.is_none() || ingest_status.is_none() {
        tokio::select! {
            status = server.wait(), if server_status.is_none() => {
                let status = status.context("cannot wait for serve unit")?;
                tracing::info!(%status, "serve unit exited");
                server_status = Some(status);
            }
            status = ingest.wait(), if ingest_status.is_none() => {
                let status = status.context("cannot wait for ingest unit")?;
                tracing::info!(%status, "ingest unit exited");
                ingest_status = Some(status);
            }
            name = signals.recv_next() => {
                tracing::info!(signal = name, "forwarding termination to units");
                for child in [&mut server, &mut ingest] {
                    if let Err(e) = terminate(child) {
                        tracing::debug!(error = %e, "unit already gone");
                    }
                }
            }
        }
    }

    Ok(server_status.is_some_and(|s| s.success()) && ingest_status.is_some_and(|s| s.success()))
}

/// Ask a child to terminate: SIGTERM on unix, a hard kill elsewhere.
fn terminate(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let Some(pid) = child.id() else {
            return Ok(());
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

fn exit_signal(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }

    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> ServerSupervisor {
        ServerSupervisor::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_cooldown(Duration::from_millis(20))
            .with_grace(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_clean_exit_is_not_restarted() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("runs");
        let script = format!("echo x >> {}; exit 0", marker.display());

        let exit = sh(&script).run(Shutdown::new()).await.unwrap();
        assert!(matches!(exit, ServerExit::Finished(s) if s.success()));
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_crash_is_restarted_until_clean_exit() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("runs");
        // fail twice, then succeed
        let script = format!(
            "echo x >> {m}; [ $(wc -l < {m}) -ge 3 ] && exit 0 || exit 1",
            m = marker.display()
        );

        let exit = sh(&script).run(Shutdown::new()).await.unwrap();
        assert!(matches!(exit, ServerExit::Finished(s) if s.success()));
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_signal_death_is_not_restarted() {
        let exit = sh("kill -9 $$").run(Shutdown::new()).await.unwrap();
        match exit {
            ServerExit::Finished(status) => assert_eq!(exit_signal(&status), Some(9)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_server() {
        let shutdown = Shutdown::new();
        let sup = sh("sleep 30");
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let exit = tokio::time::timeout(Duration::from_secs(5), sup.run(shutdown))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ServerExit::Stopped);
    }

    #[tokio::test]
    async fn test_sigterm_ignored_falls_back_to_kill() {
        let shutdown = Shutdown::new();
        let sup = sh("trap '' TERM; sleep 30 & wait");
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let exit = tokio::time::timeout(Duration::from_secs(5), sup.run(shutdown))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ServerExit::Stopped);
    }

    #[tokio::test]
    async fn test_missing_program_fails_first_launch() {
        let sup = ServerSupervisor::new("/definitely/not/a/program", vec![]);
        assert!(sup.run(Shutdown::new()).await.is_err());
    }
}
