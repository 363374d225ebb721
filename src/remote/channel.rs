use crate::config::SshSettings;
use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The single primitive every remote filesystem operation is built on:
/// send one shell command line, get text back.
///
/// Implementations must treat a non-zero exit status or a timeout as an error.
pub trait CommandChannel: Send + Sync {
    fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Copy a local file into the channel's filesystem.
    fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy a file from the channel's filesystem to a local path.
    fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Human-readable endpoint label for logs and errors.
    fn endpoint(&self) -> String;
}

/// Executes commands on a remote host through the system `ssh` client.
pub struct SshChannel {
    settings: SshSettings,
}

impl SshChannel {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.connect_timeout_secs)
    }

    fn ssh_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-i")
            .arg(&self.settings.key_path)
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.settings.connect_timeout_secs
            ))
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(self.settings.port.to_string())
            .arg(format!("{}@{}", self.settings.user, self.settings.host))
            .arg("--")
            .arg(remote_command);
        cmd
    }

    fn scp_target(&self, remote: &str) -> String {
        // scp resolves the remote path through the remote shell, so it needs
        // the same quoting as any other interpolated path.
        format!(
            "{}@{}:{}",
            self.settings.user,
            self.settings.host,
            super::commands::shell_escape(remote)
        )
    }

    fn run_scp(&self, from: &str, to: &str) -> Result<()> {
        let mut cmd = Command::new("scp");
        cmd.arg("-i")
            .arg(&self.settings.key_path)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-P")
            .arg(self.settings.port.to_string())
            .arg(from)
            .arg(to);

        let output = run_with_timeout(cmd, self.timeout(), &self.settings.host)?;
        debug!("scp {} -> {} ok ({} stderr bytes)", from, to, output.stderr.len());
        Ok(())
    }
}

impl CommandChannel for SshChannel {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("ssh {}: {}", self.settings.host, command);
        run_with_timeout(self.ssh_command(command), self.timeout(), &self.settings.host)
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.run_scp(&local.to_string_lossy(), &self.scp_target(remote))
    }

    fn download(&self, remote: &str, local: &Path) -> Result<()> {
        self.run_scp(&self.scp_target(remote), &local.to_string_lossy())
    }

    fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.settings.user, self.settings.host, self.settings.port)
    }
}

/// Runs commands against the local shell. Lets the remote-side components
/// operate on a second directory tree on this machine, and backs the
/// integration tests.
pub struct LocalShellChannel {
    timeout: Duration,
}

impl LocalShellChannel {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalShellChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for LocalShellChannel {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("sh -c: {}", command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        run_with_timeout(cmd, self.timeout, "localhost")
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        if let Some(parent) = Path::new(remote).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local, remote)?;
        Ok(())
    }

    fn download(&self, remote: &str, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(remote, local)?;
        Ok(())
    }

    fn endpoint(&self) -> String {
        "localhost".to_string()
    }
}

/// Spawn the command, collect stdout/stderr on reader threads, and enforce a
/// hard wall-clock deadline. A timed-out child is killed and surfaced as a
/// connection failure rather than left to hang the pipeline.
fn run_with_timeout(mut cmd: Command, timeout: Duration, host: &str) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| Error::ConnectionFailed {
        host: host.to_string(),
        message: format!("failed to spawn: {e}"),
    })?;

    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_child(&mut child);
                    return Err(Error::ConnectionFailed {
                        host: host.to_string(),
                        message: format!("command timed out after {:?}", timeout),
                    });
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                kill_child(&mut child);
                return Err(Error::ConnectionFailed {
                    host: host.to_string(),
                    message: format!("wait failed: {e}"),
                });
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    if !status.success() {
        return Err(Error::CommandFailed {
            exit_code: status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut reader) = source {
            if let Err(e) = reader.read_to_string(&mut buf) {
                warn!("failed reading child output: {}", e);
            }
        }
        buf
    })
}

fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("failed to kill timed-out child: {}", e);
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_shell_captures_stdout() {
        let channel = LocalShellChannel::new();
        let out = channel.execute("echo hello").unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let channel = LocalShellChannel::new();
        let err = channel.execute("exit 3").unwrap_err();
        match err {
            Error::CommandFailed { exit_code, .. } => assert_eq!(exit_code, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_surfaces_as_connection_failure() {
        let channel = LocalShellChannel::with_timeout(Duration::from_millis(100));
        let err = channel.execute("sleep 5").unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
    }
}
