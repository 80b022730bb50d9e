//! Program records: the live pairing of an immutable [`ProgramConfig`] with
//! its mutable runtime state, plus the catalog type the engine owns.

use crate::config::ProgramConfig;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::process::Child;

/// Lines retained per captured stream for `tail` when no logfile is
/// configured.
pub const TAIL_BUFFER_LINES: usize = 100;

/// Placeholder uptime for programs without a running child.
pub const NO_UPTIME: &str = "--:--:--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ProgramState {
    #[default]
    Stopped,
    /// Transient, visible only while `start` is attempting to spawn.
    Starting,
    Running,
    Exited,
}

/// Bounded line buffer fed by a stream pump task and drained by `tail`.
pub type TailBuffer = Arc<Mutex<VecDeque<String>>>;

pub fn new_tail_buffer() -> TailBuffer {
    Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_BUFFER_LINES)))
}

pub fn push_tail_line(buffer: &TailBuffer, line: String) {
    let mut buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
    if buffer.len() == TAIL_BUFFER_LINES {
        buffer.pop_front();
    }
    buffer.push_back(line);
}

/// Last `n` buffered lines, oldest first. Non-destructive.
pub fn last_tail_lines(buffer: &TailBuffer, n: usize) -> Vec<String> {
    let buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
    buffer.iter().rev().take(n).rev().cloned().collect()
}

/// Mutable per-program state. Either all of `child`/`pid`/`start_ts` are
/// present (the program is running) or none are.
#[derive(Default)]
pub struct ProgramRuntime {
    pub state: ProgramState,
    pub child: Option<Child>,
    pub pid: Option<u32>,
    pub start_ts: Option<Instant>,
    /// Present only while running without a configured stdout logfile.
    pub stdout_tail: Option<TailBuffer>,
    pub stderr_tail: Option<TailBuffer>,
}

impl ProgramRuntime {
    /// Drop the child handle and all bookkeeping, leaving the given state.
    pub fn clear(&mut self, state: ProgramState) {
        self.state = state;
        self.child = None;
        self.pid = None;
        self.start_ts = None;
        self.stdout_tail = None;
        self.stderr_tail = None;
    }
}

pub struct Program {
    pub config: ProgramConfig,
    pub runtime: ProgramRuntime,
}

impl Program {
    pub fn new(config: ProgramConfig) -> Self {
        Self {
            config,
            runtime: ProgramRuntime::default(),
        }
    }
}

/// The catalog: program name to record, in configuration order.
pub type Catalog = IndexMap<String, Program>;

/// Format an uptime as `HH:MM:SS`, wrapping at 24 hours (wallclock
/// arithmetic on the difference).
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(61)), "00:01:01");
        assert_eq!(format_uptime(Duration::from_secs(3 * 3600 + 42)), "03:00:42");
        // wallclock wrap at 24h
        assert_eq!(format_uptime(Duration::from_secs(25 * 3600)), "01:00:00");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ProgramState::Running.to_string(), "RUNNING");
        assert_eq!(ProgramState::Stopped.to_string(), "STOPPED");
        assert_eq!(ProgramState::Exited.to_string(), "EXITED");
        assert_eq!(ProgramState::Starting.to_string(), "STARTING");
    }

    #[test]
    fn test_tail_buffer_is_bounded() {
        let buffer = new_tail_buffer();
        for i in 0..(TAIL_BUFFER_LINES + 10) {
            push_tail_line(&buffer, format!("line {i}"));
        }
        let lines = last_tail_lines(&buffer, TAIL_BUFFER_LINES + 10);
        assert_eq!(lines.len(), TAIL_BUFFER_LINES);
        assert_eq!(lines.last().unwrap(), &format!("line {}", TAIL_BUFFER_LINES + 9));
    }

    #[test]
    fn test_runtime_clear_resets_bookkeeping() {
        let mut runtime = ProgramRuntime {
            state: ProgramState::Running,
            pid: Some(1234),
            start_ts: Some(Instant::now()),
            stdout_tail: Some(new_tail_buffer()),
            ..Default::default()
        };
        runtime.clear(ProgramState::Exited);
        assert_eq!(runtime.state, ProgramState::Exited);
        assert!(runtime.pid.is_none());
        assert!(runtime.start_ts.is_none());
        assert!(runtime.stdout_tail.is_none());
    }
}
