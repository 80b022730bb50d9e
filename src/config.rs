//! Configuration loading and validation.
//!
//! A single validation pass turns the YAML document into a fully typed
//! program catalog plus the control-server port, or fails with the first
//! [`ConfigError`] encountered. Nothing downstream ever re-validates: once a
//! [`ProgramConfig`] exists it is trusted by the engine.

use crate::env;
use crate::error::{ConfigError, find_similar};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Port used when the configuration has no `server` section.
pub const DEFAULT_PORT: u16 = 10000;

const SECTIONS: &[&str] = &["server", "programs"];

const PROGRAM_OPTIONS: &[&str] = &[
    "command",
    "autostart",
    "autorestart",
    "instances",
    "restarts",
    "kill_timeout",
    "startup_wait",
    "stop_signal",
    "expected_exit",
    "stdout_logfile",
    "stderr_logfile",
    "environment",
    "dir",
    "umask",
];

/// Restart policy applied by the monitor tick when a child exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Autorestart {
    #[default]
    Always,
    Never,
    Unexpected,
}

/// The four signals a program may be stopped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StopSignal {
    #[strum(serialize = "SIGINT")]
    Sigint,
    #[strum(serialize = "SIGQUIT")]
    Sigquit,
    #[strum(serialize = "SIGKILL")]
    Sigkill,
    #[strum(serialize = "SIGTERM")]
    Sigterm,
}

impl StopSignal {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            2 => Some(StopSignal::Sigint),
            3 => Some(StopSignal::Sigquit),
            9 => Some(StopSignal::Sigkill),
            15 => Some(StopSignal::Sigterm),
            _ => None,
        }
    }

    pub fn number(&self) -> i32 {
        match self {
            StopSignal::Sigint => 2,
            StopSignal::Sigquit => 3,
            StopSignal::Sigkill => 9,
            StopSignal::Sigterm => 15,
        }
    }

    #[cfg(unix)]
    pub fn as_nix(&self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            StopSignal::Sigint => Signal::SIGINT,
            StopSignal::Sigquit => Signal::SIGQUIT,
            StopSignal::Sigkill => Signal::SIGKILL,
            StopSignal::Sigterm => Signal::SIGTERM,
        }
    }
}

/// One supervised program as configured. Immutable after load; `update`
/// swaps whole values rather than mutating in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramConfig {
    pub name: String,
    pub command: Vec<String>,
    pub autostart: bool,
    pub autorestart: Autorestart,
    /// Startup retry attempts on top of the initial spawn.
    pub restarts: u32,
    /// Seconds to wait after the stop signal before escalating to SIGKILL.
    pub kill_timeout: u64,
    /// Seconds a child must stay alive after spawn to count as started.
    pub startup_wait: f64,
    pub instances: u32,
    pub stop_signal: StopSignal,
    pub expected_exit: Vec<i32>,
    /// `None` means the supervisor keeps a pipe and an in-memory tail buffer.
    pub stdout_logfile: Option<PathBuf>,
    pub stderr_logfile: Option<PathBuf>,
    /// Empty means the child inherits the supervisor environment.
    pub environment: IndexMap<String, String>,
    pub dir: Option<PathBuf>,
    pub umask: u32,
}

impl ProgramConfig {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            autostart: true,
            autorestart: Autorestart::Always,
            restarts: 3,
            kill_timeout: 3,
            startup_wait: 0.1,
            instances: 1,
            stop_signal: StopSignal::Sigterm,
            expected_exit: vec![0],
            stdout_logfile: None,
            stderr_logfile: None,
            environment: IndexMap::new(),
            dir: None,
            umask: 0o22,
        }
    }
}

/// The validated result of a configuration load.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The file the document was read from; `reread` loads from here again.
    pub path: PathBuf,
    pub port: u16,
    pub programs: IndexMap<String, ProgramConfig>,
}

/// Load and validate a configuration file. With no explicit path the default
/// locations are probed in order.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = resolve_path(path)?;
    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        details: Some(e.to_string()),
    })?;
    parse_document(&path, &raw)
}

/// Best-effort extraction of `server.port` for the control client. Does not
/// validate programs and never probes the filesystem beyond reading the file.
pub fn server_port(path: Option<&Path>) -> u16 {
    fn extract(path: Option<&Path>) -> Option<u16> {
        let path = resolve_path(path).ok()?;
        let raw = std::fs::read_to_string(path).ok()?;
        let doc: Value = serde_yaml::from_str(&raw).ok()?;
        let port = doc.get("server")?.get("port")?.as_u64()?;
        u16::try_from(port).ok()
    }
    extract(path).unwrap_or(DEFAULT_PORT)
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                details: Some("no such file".to_string()),
            });
        }
        return Ok(path.to_path_buf());
    }
    env::CONFIG_SEARCH_PATHS
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            searched: env::CONFIG_SEARCH_PATHS
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        })
}

/// Parse and validate a whole document. Split from [`load`] so tests can
/// feed documents without touching the search path.
pub fn parse_document(path: &Path, raw: &str) -> Result<Settings, ConfigError> {
    let doc: Value = serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        details: Some(e.to_string()),
    })?;
    let doc = doc.as_mapping().ok_or_else(|| ConfigError::ParseError {
        path: path.to_path_buf(),
        details: Some("top level must be a mapping".to_string()),
    })?;

    let mut port = DEFAULT_PORT;
    let mut programs = IndexMap::new();

    for (key, value) in doc {
        match key.as_str() {
            Some("server") => port = validate_server(value)?,
            Some("programs") => programs = validate_programs(value, path)?,
            other => {
                let section = other.map(str::to_string).unwrap_or_else(|| display(key));
                return Err(ConfigError::UnknownSection {
                    suggestion: find_similar(&section, SECTIONS.iter().copied()),
                    section,
                });
            }
        }
    }

    Ok(Settings {
        path: path.to_path_buf(),
        port,
        programs: expand_instances(programs),
    })
}

fn validate_server(value: &Value) -> Result<u16, ConfigError> {
    let mapping = value.as_mapping().ok_or_else(|| ConfigError::InvalidPort {
        value: display(value),
    })?;
    let mut port = DEFAULT_PORT;
    for (key, value) in mapping {
        match key.as_str() {
            Some("port") => {
                port = parse_int(value)
                    .and_then(|n| u16::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ConfigError::InvalidPort {
                        value: display(value),
                    })?;
            }
            other => {
                let option = other.map(str::to_string).unwrap_or_else(|| display(key));
                return Err(ConfigError::UnknownOption {
                    program: "server".to_string(),
                    suggestion: find_similar(&option, ["port"].into_iter()),
                    option,
                });
            }
        }
    }
    Ok(port)
}

fn validate_programs(
    value: &Value,
    path: &Path,
) -> Result<IndexMap<String, ProgramConfig>, ConfigError> {
    let mapping = value.as_mapping().ok_or_else(|| ConfigError::ParseError {
        path: path.to_path_buf(),
        details: Some("'programs' must be a mapping of program names".to_string()),
    })?;
    let mut programs = IndexMap::new();
    for (key, value) in mapping {
        let name = key
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| display(key));
        let config = validate_program(&name, value, path)?;
        programs.insert(name, config);
    }
    Ok(programs)
}

fn validate_program(name: &str, value: &Value, path: &Path) -> Result<ProgramConfig, ConfigError> {
    let mapping: &Mapping = value.as_mapping().ok_or_else(|| ConfigError::ParseError {
        path: path.to_path_buf(),
        details: Some(format!("program '{name}' must be a mapping of options")),
    })?;

    let mut config = ProgramConfig::new(name, vec![]);

    for (key, value) in mapping {
        let option = match key.as_str() {
            Some(option) => option,
            None => {
                return Err(ConfigError::UnknownOption {
                    program: name.to_string(),
                    option: display(key),
                    suggestion: None,
                });
            }
        };
        match option {
            "command" => config.command = parse_command(name, value)?,
            "autostart" => config.autostart = parse_bool(name, option, value)?,
            "autorestart" => {
                config.autorestart = value
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid(name, option, value, "one of: always, never, unexpected"))?;
            }
            "instances" => {
                config.instances = parse_uint(name, option, value)?;
                if config.instances == 0 {
                    return Err(invalid(name, option, value, "a positive integer"));
                }
            }
            "restarts" => config.restarts = parse_uint(name, option, value)?,
            "kill_timeout" => config.kill_timeout = parse_uint(name, option, value)? as u64,
            "startup_wait" => {
                config.startup_wait = parse_float(value)
                    .filter(|f| *f >= 0.0)
                    .ok_or_else(|| invalid(name, option, value, "a non-negative number of seconds"))?;
            }
            "stop_signal" => {
                config.stop_signal = parse_int(value)
                    .and_then(StopSignal::from_number)
                    .ok_or_else(|| invalid(name, option, value, "one of: 2 (SIGINT), 3 (SIGQUIT), 9 (SIGKILL), 15 (SIGTERM)"))?;
            }
            "expected_exit" => config.expected_exit = parse_exit_codes(name, option, value)?,
            "stdout_logfile" => {
                config.stdout_logfile = Some(parse_logfile(name, option, value)?);
            }
            "stderr_logfile" => {
                config.stderr_logfile = Some(parse_logfile(name, option, value)?);
            }
            "environment" => config.environment = parse_environment(name, option, value)?,
            "dir" => {
                let dir = PathBuf::from(
                    value
                        .as_str()
                        .ok_or_else(|| invalid(name, option, value, "a directory path"))?,
                );
                probe_dir(name, &dir)?;
                config.dir = Some(dir);
            }
            "umask" => {
                config.umask = parse_umask(value)
                    .ok_or_else(|| invalid(name, option, value, "an octal integer, e.g. 022"))?;
            }
            unknown => {
                return Err(ConfigError::UnknownOption {
                    program: name.to_string(),
                    option: unknown.to_string(),
                    suggestion: find_similar(unknown, PROGRAM_OPTIONS.iter().copied()),
                });
            }
        }
    }

    if config.command.is_empty() {
        return Err(ConfigError::MissingCommand {
            program: name.to_string(),
        });
    }
    Ok(config)
}

fn parse_command(name: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let seq = value.as_sequence().ok_or_else(|| ConfigError::NotAList {
        program: name.to_string(),
        option: "command".to_string(),
    })?;
    let mut argv = Vec::with_capacity(seq.len());
    for item in seq {
        match item {
            Value::String(s) => argv.push(s.clone()),
            Value::Number(n) => argv.push(n.to_string()),
            Value::Bool(b) => argv.push(b.to_string()),
            other => {
                return Err(invalid(name, "command", other, "a list of argv strings"));
            }
        }
    }
    if argv.is_empty() {
        return Err(ConfigError::MissingCommand {
            program: name.to_string(),
        });
    }
    Ok(argv)
}

fn parse_bool(name: &str, option: &str, value: &Value) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(invalid(name, option, other, "one of: true, false")),
    }
}

fn parse_uint(name: &str, option: &str, value: &Value) -> Result<u32, ConfigError> {
    parse_int(value)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(name, option, value, "a non-negative base-10 integer"))
}

/// Base-10 integer, given either as a YAML number or a quoted string.
fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Umask parses in base 8 whatever the YAML scalar type: `022` arrives as
/// the number 22 and still means `0o22`.
fn parse_umask(value: &Value) -> Option<u32> {
    let digits = match value {
        Value::Number(n) => n.as_u64()?.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    u32::from_str_radix(&digits, 8).ok().filter(|m| *m <= 0o777)
}

fn parse_exit_codes(name: &str, option: &str, value: &Value) -> Result<Vec<i32>, ConfigError> {
    let seq = value.as_sequence().ok_or_else(|| ConfigError::NotAList {
        program: name.to_string(),
        option: option.to_string(),
    })?;
    seq.iter()
        .map(|item| {
            parse_int(item)
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(name, option, item, "a list of integer exit codes"))
        })
        .collect()
}

fn parse_environment(
    name: &str,
    option: &str,
    value: &Value,
) -> Result<IndexMap<String, String>, ConfigError> {
    let seq = value.as_sequence().ok_or_else(|| ConfigError::NotAList {
        program: name.to_string(),
        option: option.to_string(),
    })?;
    let mut environment = IndexMap::new();
    for item in seq {
        let entry = item
            .as_str()
            .ok_or_else(|| invalid(name, option, item, "entries of the form \"KEY:VALUE\""))?;
        let (key, val) = entry
            .split_once(':')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| invalid(name, option, item, "entries of the form \"KEY:VALUE\""))?;
        environment.insert(key.to_string(), val.to_string());
    }
    Ok(environment)
}

/// Probe a logfile for writability by opening (and creating) it, then
/// dropping the handle. The engine reopens it at spawn time.
fn parse_logfile(name: &str, option: &str, value: &Value) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(
        value
            .as_str()
            .ok_or_else(|| invalid(name, option, value, "a writable file path"))?,
    );
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ConfigError::UnwritableLogfile {
            program: name.to_string(),
            path: path.clone(),
            details: Some(e.to_string()),
        })?;
    Ok(path)
}

/// Probe a working directory for enterability without chdir'ing the
/// supervisor: being able to list it is what spawning into it needs.
fn probe_dir(name: &str, dir: &Path) -> Result<(), ConfigError> {
    if dir.is_dir() && std::fs::read_dir(dir).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::BadDir {
            program: name.to_string(),
            path: dir.to_path_buf(),
        })
    }
}

/// Expand `instances > 1` into sibling records `name(0)…name(n-1)`,
/// dropping the base name.
fn expand_instances(programs: IndexMap<String, ProgramConfig>) -> IndexMap<String, ProgramConfig> {
    let mut expanded = IndexMap::new();
    for (name, config) in programs {
        if config.instances > 1 {
            for i in 0..config.instances {
                let mut sibling = config.clone();
                sibling.name = format!("{name}({i})");
                expanded.insert(sibling.name.clone(), sibling);
            }
        } else {
            expanded.insert(name, config);
        }
    }
    expanded
}

fn invalid(name: &str, option: &str, value: &Value, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        program: name.to_string(),
        option: option.to_string(),
        value: display(value),
        expected: Some(format!("expected {expected}")),
    }
}

fn display(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Settings, ConfigError> {
        parse_document(Path::new("/tmp/overseer-test.yml"), raw)
    }

    #[test]
    fn test_defaults() {
        let settings = parse(
            r#"
programs:
  sleepy:
    command: [/bin/sleep, "10"]
"#,
        )
        .unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        let p = settings.programs.get("sleepy").unwrap();
        assert!(p.autostart);
        assert_eq!(p.autorestart, Autorestart::Always);
        assert_eq!(p.restarts, 3);
        assert_eq!(p.kill_timeout, 3);
        assert_eq!(p.stop_signal, StopSignal::Sigterm);
        assert_eq!(p.expected_exit, vec![0]);
        assert_eq!(p.umask, 0o22);
        assert!(p.environment.is_empty());
    }

    #[test]
    fn test_umask_parses_base_8() {
        let settings = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    umask: 022
"#,
        )
        .unwrap();
        assert_eq!(settings.programs.get("a").unwrap().umask, 0o22);

        let settings = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    umask: "077"
"#,
        )
        .unwrap();
        assert_eq!(settings.programs.get("a").unwrap().umask, 0o77);

        let err = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    umask: 99
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_stop_signal_mapping() {
        for (n, sig) in [
            (2, StopSignal::Sigint),
            (3, StopSignal::Sigquit),
            (9, StopSignal::Sigkill),
            (15, StopSignal::Sigterm),
        ] {
            assert_eq!(StopSignal::from_number(n), Some(sig));
            assert_eq!(sig.number() as i64, n);
        }
        assert_eq!(StopSignal::from_number(1), None);
        assert_eq!(StopSignal::Sigterm.to_string(), "SIGTERM");
    }

    #[test]
    fn test_unknown_option_suggests() {
        let err = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    autostar: true
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::UnknownOption {
                option, suggestion, ..
            } => {
                assert_eq!(option, "autostar");
                let suggestion = suggestion.expect("should suggest a close option");
                assert!(suggestion.contains("autostart"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_command_required_and_list_shaped() {
        let err = parse("programs:\n  a: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingCommand { .. }));

        let err = parse("programs:\n  a:\n    command: /bin/true\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotAList { .. }));
    }

    #[test]
    fn test_bool_literals_only() {
        let err = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    autostart: yes
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_environment_entries() {
        let settings = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    environment: ["HOME:/tmp", "PATH:/bin:/usr/bin"]
"#,
        )
        .unwrap();
        let env = &settings.programs.get("a").unwrap().environment;
        assert_eq!(env.get("HOME").unwrap(), "/tmp");
        // the split happens exactly once, extra colons stay in the value
        assert_eq!(env.get("PATH").unwrap(), "/bin:/usr/bin");

        let err = parse(
            r#"
programs:
  a:
    command: [/bin/true]
    environment: ["NOCOLON"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_instances_expansion() {
        let settings = parse(
            r#"
programs:
  worker:
    command: [/bin/sleep, "10"]
    instances: 3
  single:
    command: [/bin/true]
"#,
        )
        .unwrap();
        let names: Vec<&str> = settings.programs.keys().map(String::as_str).collect();
        assert_eq!(names, ["worker(0)", "worker(1)", "worker(2)", "single"]);
        assert!(!settings.programs.contains_key("worker"));
    }

    #[test]
    fn test_unknown_section() {
        let err = parse("prgrams:\n  a:\n    command: [/bin/true]\n").unwrap_err();
        match err {
            ConfigError::UnknownSection {
                section,
                suggestion,
            } => {
                assert_eq!(section, "prgrams");
                assert!(suggestion.unwrap().contains("programs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_server_port() {
        let settings = parse("server:\n  port: 4242\n").unwrap();
        assert_eq!(settings.port, 4242);

        let err = parse("server:\n  port: 70000\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));

        let err = parse("server:\n  port: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }
}
