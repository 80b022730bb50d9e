//! Status rendering and tail.

use super::Supervisor;
use crate::program::{NO_UPTIME, format_uptime, last_tail_lines};
use crate::protocol::OutputStream;
use itertools::Itertools;
use std::path::Path;
use std::time::Duration;

const TAIL_LINES: usize = 10;
const TAIL_TIMEOUT: Duration = Duration::from_secs(3);

impl Supervisor {
    /// One space-padded record per program in configuration order, joined
    /// with `|`:
    /// `{name:25}{state:10}pid {pid_or_None}, {:11}uptime {HH:MM:SS}`.
    pub fn status(&self) -> String {
        self.catalog
            .iter()
            .map(|(name, program)| {
                let pid = program
                    .runtime
                    .pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| "None".to_string());
                let uptime = program
                    .runtime
                    .start_ts
                    .map(|ts| format_uptime(ts.elapsed()))
                    .unwrap_or_else(|| NO_UPTIME.to_string());
                format!(
                    "{:<25}{:<10}pid {:<11}uptime {uptime}|",
                    name,
                    program.runtime.state.to_string(),
                    format!("{pid},"),
                )
            })
            .join("")
    }

    /// Last lines of a program's output stream: from the logfile when one
    /// is configured, from the in-memory buffer when the supervisor holds
    /// the pipe.
    pub async fn tail(&self, name: &str, stream: OutputStream) -> String {
        let Some(program) = self.catalog.get(name) else {
            return format!("{name}: no such program|");
        };
        let logfile = match stream {
            OutputStream::Stdout => &program.config.stdout_logfile,
            OutputStream::Stderr => &program.config.stderr_logfile,
        };
        match logfile {
            Some(path) if path == Path::new("/dev/null") => {
                format!("{name}: output is directed to /dev/null")
            }
            Some(path) => tail_logfile(path).await,
            None => {
                let buffer = match stream {
                    OutputStream::Stdout => &program.runtime.stdout_tail,
                    OutputStream::Stderr => &program.runtime.stderr_tail,
                };
                match buffer {
                    Some(buffer) => last_tail_lines(buffer, TAIL_LINES).join("|"),
                    None => format!("{name}: no captured output|"),
                }
            }
        }
    }
}

/// Read the last lines of a logfile with a bounded reverse reader, under a
/// hard timeout so a slow filesystem cannot stall the control loop.
async fn tail_logfile(path: &Path) -> String {
    let path = path.to_path_buf();
    let read = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<String>> {
        let file = std::fs::File::open(&path)?;
        let mut lines: Vec<String> = rev_lines::RevLines::new(file)
            .into_iter()
            .filter_map(Result::ok)
            .take(TAIL_LINES)
            .collect();
        lines.reverse();
        Ok(lines)
    });
    match tokio::time::timeout(TAIL_TIMEOUT, read).await {
        Ok(Ok(Ok(lines))) => lines.join("|"),
        Ok(Ok(Err(e))) => format!("tail: {e}"),
        Ok(Err(e)) => format!("tail: {e}"),
        Err(_) => format!("tail: timed out after {} seconds", TAIL_TIMEOUT.as_secs()),
    }
}
