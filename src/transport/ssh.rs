//! `OpenSSH` transport implementation.
//!
//! One pooled connection is one `OpenSSH` control master: a background
//! `ssh -N` process holding an authenticated, multiplexed connection via
//! a control socket. Each `exec` spawns a multiplexed client over that
//! socket with piped stdio; a pump task forwards stdout/stderr chunks and
//! the exit status as [`ExecEvent`]s.
//!
//! Signal semantics at this boundary: `Interrupt` delivers SIGINT to the
//! local multiplexed client, which tears down the session channel so the
//! server hangs up the remote command; `Kill` hard-kills the local
//! client. Signal delivery is unix-only and best-effort.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::SshConfig;
use crate::transport::{
    ControlSignal, ExecChannel, ExecEvent, RemoteConnection, RemoteTransport, SignalHandle,
};
use crate::{AppError, Result};

/// How long to wait for the control socket to appear after spawning the
/// master process.
const MASTER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll interval while waiting for the control socket.
const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read buffer size for exec output pumps.
const READ_BUF_BYTES: usize = 8192;

/// Capacity of the per-exec event channel.
const EXEC_CHANNEL_CAPACITY: usize = 64;

/// Transport over the `OpenSSH` client binary with control-master
/// multiplexing.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    config: SshConfig,
}

impl OpenSshTransport {
    /// Create a transport for the configured host.
    #[must_use]
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }
}

impl RemoteTransport for OpenSshTransport {
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn RemoteConnection>>> + Send + '_>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.config.control_dir)
                .await
                .map_err(|err| {
                    AppError::Connection(format!("cannot create control dir: {err}"))
                })?;

            let socket = self
                .config
                .control_dir
                .join(format!("cm-{}.sock", uuid::Uuid::new_v4()));

            let mut cmd = Command::new("ssh");
            cmd.arg("-N")
                .arg("-o")
                .arg("BatchMode=yes")
                .arg("-o")
                .arg("ControlMaster=yes")
                .arg("-o")
                .arg(format!("ControlPath={}", socket.display()))
                .arg("-o")
                .arg("ServerAliveInterval=15")
                .arg("-o")
                .arg("ServerAliveCountMax=3")
                .arg("-i")
                .arg(&self.config.key_path)
                .arg("-p")
                .arg(self.config.port.to_string())
                .arg(self.destination())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut master = cmd
                .spawn()
                .map_err(|err| AppError::Connection(format!("failed to spawn ssh: {err}")))?;

            // Drain master stderr to the log so keepalive chatter cannot
            // fill the pipe and wedge the process.
            if let Some(stderr) = master.stderr.take() {
                tokio::spawn(drain_to_log(stderr));
            }

            // The control socket appearing is the ready signal.
            let deadline = tokio::time::Instant::now() + MASTER_STARTUP_TIMEOUT;
            loop {
                if tokio::fs::try_exists(&socket).await.unwrap_or(false) {
                    break;
                }
                if let Ok(Some(status)) = master.try_wait() {
                    return Err(AppError::Connection(format!(
                        "ssh master exited during startup: {status}"
                    )));
                }
                if tokio::time::Instant::now() >= deadline {
                    master.kill().await.ok();
                    return Err(AppError::Connection(format!(
                        "ssh master did not become ready within {MASTER_STARTUP_TIMEOUT:?}"
                    )));
                }
                tokio::time::sleep(MASTER_POLL_INTERVAL).await;
            }

            info!(host = %self.config.host, socket = %socket.display(), "ssh control master ready");

            Ok(Arc::new(OpenSshConnection {
                destination: self.destination(),
                port: self.config.port,
                socket,
                master: Mutex::new(Some(master)),
            }) as Arc<dyn RemoteConnection>)
        })
    }
}

/// One established control-master connection.
#[derive(Debug)]
pub struct OpenSshConnection {
    destination: String,
    port: u16,
    socket: PathBuf,
    master: Mutex<Option<Child>>,
}

impl RemoteConnection for OpenSshConnection {
    fn exec(&self, command: &str) -> Pin<Box<dyn Future<Output = Result<ExecChannel>> + Send + '_>> {
        let command = command.to_owned();
        Box::pin(async move {
            let mut cmd = Command::new("ssh");
            cmd.arg("-o")
                .arg("BatchMode=yes")
                .arg("-o")
                .arg(format!("ControlPath={}", self.socket.display()))
                .arg("-p")
                .arg(self.port.to_string())
                .arg(&self.destination)
                .arg(&command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd
                .spawn()
                .map_err(|err| AppError::Connection(format!("failed to spawn exec: {err}")))?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Connection("failed to capture exec stdout".into()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| AppError::Connection("failed to capture exec stderr".into()))?;

            let (event_tx, events) = mpsc::channel(EXEC_CHANNEL_CAPACITY);
            let (signal_tx, signal_rx) = mpsc::unbounded_channel();

            let pid = child.id();
            tokio::spawn(apply_signals(pid, signal_rx));
            debug!(?pid, command = %command, "exec started over control master");
            tokio::spawn(pump_exec(child, stdout, stderr, event_tx));

            Ok(ExecChannel {
                events,
                signals: SignalHandle::new(signal_tx),
            })
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let master = self.master.lock().await.take();
            if let Some(mut master) = master {
                debug!(socket = %self.socket.display(), "closing ssh control master");
                master.kill().await.ok();
            }
            tokio::fs::remove_file(&self.socket).await.ok();
        })
    }
}

/// Forward stdout/stderr chunks, then the exit status, as [`ExecEvent`]s.
async fn pump_exec(
    mut child: Child,
    mut stdout: impl AsyncRead + Unpin + Send,
    mut stderr: impl AsyncRead + Unpin + Send,
    tx: mpsc::Sender<ExecEvent>,
) {
    let mut out_buf = vec![0u8; READ_BUF_BYTES];
    let mut err_buf = vec![0u8; READ_BUF_BYTES];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read {
                Ok(0) => out_open = false,
                Ok(n) => {
                    if tx.send(ExecEvent::Stdout(out_buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(ExecEvent::Failed(format!("stdout read: {err}"))).await;
                    child.kill().await.ok();
                    return;
                }
            },
            read = stderr.read(&mut err_buf), if err_open => match read {
                Ok(0) => err_open = false,
                Ok(n) => {
                    if tx.send(ExecEvent::Stderr(err_buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(ExecEvent::Failed(format!("stderr read: {err}"))).await;
                    child.kill().await.ok();
                    return;
                }
            },
        }
    }

    match child.wait().await {
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            let _ = tx.send(ExecEvent::Exited(code)).await;
        }
        Err(err) => {
            let _ = tx
                .send(ExecEvent::Failed(format!("wait for exec: {err}")))
                .await;
        }
    }
}

/// Deliver control signals to the local exec client by pid.
///
/// Exits when every [`SignalHandle`] clone for the invocation is dropped.
async fn apply_signals(pid: Option<u32>, mut rx: mpsc::UnboundedReceiver<ControlSignal>) {
    while let Some(signal) = rx.recv().await {
        deliver(pid, signal);
    }
}

#[cfg(unix)]
fn deliver(pid: Option<u32>, signal: ControlSignal) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        debug!("signal target already gone");
        return;
    };
    let sig = match signal {
        ControlSignal::Interrupt => Signal::SIGINT,
        ControlSignal::Kill => Signal::SIGKILL,
    };
    if let Err(err) = kill(Pid::from_raw(pid), sig) {
        debug!(pid, ?sig, %err, "signal delivery failed (process likely exited)");
    }
}

#[cfg(not(unix))]
fn deliver(_pid: Option<u32>, signal: ControlSignal) {
    tracing::warn!(?signal, "signal delivery is unsupported on this platform");
}

/// Drain a child stderr to the debug log line by line.
async fn drain_to_log(stderr: impl AsyncRead + Unpin + Send) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "ssh master");
    }
}
