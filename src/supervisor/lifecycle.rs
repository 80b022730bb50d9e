//! Program start/stop/restart algorithms.

use super::Supervisor;
use crate::config::ProgramConfig;
use crate::program::{ProgramState, TailBuffer, new_tail_buffer, push_tail_line};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time;

/// Pause between startup retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(100);

struct SpawnedChild {
    child: Child,
    stdout_tail: Option<TailBuffer>,
    stderr_tail: Option<TailBuffer>,
}

impl Supervisor {
    /// Start each named program in input order; responses concatenate in
    /// the same order.
    pub async fn start_programs(&mut self, names: &[String]) -> String {
        let mut response = String::new();
        for name in self.expand_names(names) {
            response.push_str(&self.start_one(&name).await);
        }
        response
    }

    pub(crate) async fn start_one(&mut self, name: &str) -> String {
        let Some(program) = self.catalog.get_mut(name) else {
            return format!("{name}: no such program|");
        };
        if program.runtime.state.is_running() {
            match program.runtime.child.as_mut().map(|child| child.try_wait()) {
                Some(Ok(None)) => return format!("{name} is already running|"),
                // the child died under us without a monitor tick noticing
                _ => program.runtime.clear(ProgramState::Exited),
            }
        }
        let config = program.config.clone();
        if let Some(dir) = &config.dir {
            if !(dir.is_dir() && std::fs::read_dir(dir).is_ok()) {
                return format!("Can't use working dir {} for {name}|", dir.display());
            }
        }
        program.runtime.state = ProgramState::Starting;

        // budget = configured retries plus the initial attempt
        let mut attempts_left = config.restarts + 1;
        let outcome = loop {
            match spawn_child(&config) {
                Ok(mut spawned) => {
                    time::sleep(Duration::from_secs_f64(config.startup_wait)).await;
                    match spawned.child.try_wait() {
                        Ok(None) => break Some(spawned),
                        Ok(Some(status)) => {
                            debug!("{name} exited during startup wait: {status}");
                        }
                        Err(e) => warn!("{name}: probing child failed: {e}"),
                    }
                }
                Err(e) => debug!("spawning {name} failed: {e}"),
            }
            attempts_left -= 1;
            if attempts_left == 0 {
                break None;
            }
            time::sleep(RETRY_DELAY).await;
        };

        let Some(program) = self.catalog.get_mut(name) else {
            return format!("{name}: no such program|");
        };
        match outcome {
            Some(spawned) => {
                let pid = spawned.child.id();
                program.runtime.state = ProgramState::Running;
                program.runtime.pid = pid;
                program.runtime.start_ts = Some(Instant::now());
                program.runtime.stdout_tail = spawned.stdout_tail;
                program.runtime.stderr_tail = spawned.stderr_tail;
                program.runtime.child = Some(spawned.child);
                info!(
                    "{name} started successfully with pid {}",
                    pid.unwrap_or_default()
                );
                format!("{name} started successfully|")
            }
            None => {
                program.runtime.clear(ProgramState::Stopped);
                warn!(
                    "starting {name} was unsuccessful after {} retries",
                    config.restarts
                );
                format!(
                    "starting {name} was unsuccessful after {} retries|",
                    config.restarts
                )
            }
        }
    }

    /// Stop each named program: send the configured signal, wait up to
    /// `kill_timeout` seconds, escalate to SIGKILL on expiry.
    pub async fn stop_programs(&mut self, names: &[String]) -> String {
        let mut response = String::new();
        for name in self.expand_names(names) {
            response.push_str(&self.stop_one(&name).await);
        }
        response
    }

    pub(crate) async fn stop_one(&mut self, name: &str) -> String {
        let Some(program) = self.catalog.get_mut(name) else {
            return format!("{name}: no such program|");
        };
        let Some(mut child) = program.runtime.child.take() else {
            return format!("{name} is already stopped|");
        };
        let kill_timeout = program.config.kill_timeout;
        let stop_signal = program.config.stop_signal;
        let pid = program.runtime.pid.take();
        program.runtime.start_ts = None;
        program.runtime.stdout_tail = None;
        program.runtime.stderr_tail = None;

        #[cfg(unix)]
        if let Some(pid) = pid {
            debug!("sending {stop_signal} to pid {pid}");
            if let Err(e) =
                nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), stop_signal.as_nix())
            {
                // ESRCH here just means the child beat us to the exit
                debug!("kill({pid}, {stop_signal}): {e}");
            }
        }

        match time::timeout(Duration::from_secs(kill_timeout), child.wait()).await {
            Ok(wait) => {
                if let Err(e) = wait {
                    warn!("waiting on {name}: {e}");
                }
                self.set_state(name, ProgramState::Stopped);
                info!("stopped {name} successfully");
                format!("stopped {name} successfully|")
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                self.set_state(name, ProgramState::Exited);
                warn!("Killed {name} after timeout ({kill_timeout} seconds)");
                format!("Killed {name} after timeout ({kill_timeout} seconds)|")
            }
        }
    }

    /// stop(names) followed by start(names), reported as a restart.
    pub async fn restart_programs(&mut self, names: &[String]) -> String {
        let mut response = self.stop_programs(names).await;
        response.push_str(&self.start_programs(names).await);
        response.replace("started", "restarted")
    }
}

fn spawn_child(config: &ProgramConfig) -> std::io::Result<SpawnedChild> {
    let mut cmd = Command::new(&config.command[0]);
    cmd.args(&config.command[1..]);
    cmd.stdin(Stdio::null());
    if !config.environment.is_empty() {
        cmd.env_clear().envs(&config.environment);
    }
    if let Some(dir) = &config.dir {
        cmd.current_dir(dir);
    }
    match &config.stdout_logfile {
        Some(path) => {
            cmd.stdout(open_logfile(path)?);
        }
        None => {
            cmd.stdout(Stdio::piped());
        }
    }
    match &config.stderr_logfile {
        Some(path) => {
            cmd.stderr(open_logfile(path)?);
        }
        None => {
            cmd.stderr(Stdio::piped());
        }
    }
    #[cfg(unix)]
    {
        let umask = config.umask;
        unsafe {
            cmd.pre_exec(move || {
                libc::umask(umask as libc::mode_t);
                Ok(())
            });
        }
    }
    let mut child = cmd.spawn()?;
    let stdout_tail = child.stdout.take().map(pump_stream);
    let stderr_tail = child.stderr.take().map(pump_stream);
    Ok(SpawnedChild {
        child,
        stdout_tail,
        stderr_tail,
    })
}

/// The engine opens logfiles itself so it, not the child, decides
/// create/append semantics; the handle is handed to the child wholesale.
fn open_logfile(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Pump a captured stream into a bounded tail buffer. The task owns the
/// pipe end and exits once the child closes it; it never touches the
/// catalog.
fn pump_stream<R>(stream: R) -> TailBuffer
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = new_tail_buffer();
    let tail = buffer.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            push_tail_line(&tail, line);
        }
    });
    buffer
}
