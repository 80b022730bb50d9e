//! Diagnostic error types for configuration loading and the control protocol.
//!
//! Configuration errors are fatal at daemon startup and recoverable inside
//! `reread`; protocol errors never change engine state.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a configuration document.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("no configuration file found (searched: {})", searched.join(", "))]
    #[diagnostic(
        code(overseer::config::not_found),
        help("create one of the listed files or pass -c/--configuration <path>")
    )]
    NotFound { searched: Vec<String> },

    #[error("failed to read configuration file: {}", path.display())]
    #[diagnostic(code(overseer::config::read_error))]
    ReadError {
        path: PathBuf,
        #[help]
        details: Option<String>,
    },

    #[error("failed to parse configuration file: {}", path.display())]
    #[diagnostic(code(overseer::config::parse_error))]
    ParseError {
        path: PathBuf,
        #[help]
        details: Option<String>,
    },

    #[error("program '{program}': missing required option 'command'")]
    #[diagnostic(
        code(overseer::config::missing_command),
        help("command must be a list of argv strings, e.g. command: [/bin/sleep, \"10\"]")
    )]
    MissingCommand { program: String },

    #[error("program '{program}': option '{option}' must be a list")]
    #[diagnostic(code(overseer::config::not_a_list))]
    NotAList { program: String, option: String },

    #[error("program '{program}': option '{option}' has invalid value '{value}'")]
    #[diagnostic(code(overseer::config::invalid_value))]
    InvalidValue {
        program: String,
        option: String,
        value: String,
        #[help]
        expected: Option<String>,
    },

    #[error("program '{program}': unknown option '{option}'")]
    #[diagnostic(code(overseer::config::unknown_option))]
    UnknownOption {
        program: String,
        option: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("program '{program}': logfile {} is not writable", path.display())]
    #[diagnostic(code(overseer::config::unwritable_logfile))]
    UnwritableLogfile {
        program: String,
        path: PathBuf,
        #[help]
        details: Option<String>,
    },

    #[error("program '{program}': working directory {} is not enterable", path.display())]
    #[diagnostic(code(overseer::config::bad_dir))]
    BadDir { program: String, path: PathBuf },

    #[error("unknown section '{section}' in configuration")]
    #[diagnostic(code(overseer::config::unknown_section))]
    UnknownSection {
        section: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("server.port has invalid value '{value}'")]
    #[diagnostic(
        code(overseer::config::invalid_port),
        help("port must be an integer in 1..=65535")
    )]
    InvalidPort { value: String },
}

/// Errors raised while parsing a control command line.
///
/// The control client validates commands locally and refuses to send
/// malformed ones; the daemon answers with the same message when one slips
/// through anyway.
#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("Command not found: {command}")]
    #[diagnostic(code(overseer::protocol::unknown_command))]
    UnknownCommand {
        command: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("usage: {usage}")]
    #[diagnostic(code(overseer::protocol::usage))]
    Usage { usage: String },

    #[error("unknown stream '{stream}': expected stdout or stderr")]
    #[diagnostic(code(overseer::protocol::invalid_stream))]
    InvalidStream { stream: String },
}

impl ProtocolError {
    /// The suggestion line, when the error carries one.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ProtocolError::UnknownCommand { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

/// Find the most similar candidate for "did you mean" suggestions.
pub fn find_similar<'a>(name: &str, available: impl Iterator<Item = &'a str>) -> Option<String> {
    use fuzzy_matcher::FuzzyMatcher;
    use fuzzy_matcher::skim::SkimMatcherV2;

    let matcher = SkimMatcherV2::default();
    available
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(candidate, name)
                .map(|score| (candidate, score))
        })
        .max_by_key(|(_, score)| *score)
        .filter(|(_, score)| *score > 0)
        .map(|(candidate, _)| format!("did you mean '{}'?", candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingCommand {
            program: "web".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "program 'web': missing required option 'command'"
        );

        let err = ConfigError::InvalidValue {
            program: "web".to_string(),
            option: "autorestart".to_string(),
            value: "sometimes".to_string(),
            expected: Some("one of: always, never, unexpected".to_string()),
        };
        assert!(err.to_string().contains("autorestart"));
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownCommand {
            command: "stat".to_string(),
            suggestion: Some("did you mean 'status'?".to_string()),
        };
        assert_eq!(err.to_string(), "Command not found: stat");
        assert_eq!(err.suggestion(), Some("did you mean 'status'?"));

        let err = ProtocolError::Usage {
            usage: "start <name> | all".to_string(),
        };
        assert_eq!(err.to_string(), "usage: start <name> | all");
    }

    #[test]
    fn test_find_similar() {
        let options = ["autostart", "autorestart", "command", "umask"];

        let suggestion = find_similar("autostar", options.iter().copied());
        assert_eq!(suggestion, Some("did you mean 'autostart'?".to_string()));

        let suggestion = find_similar("qqq", options.iter().copied());
        assert!(suggestion.is_none());
    }
}
