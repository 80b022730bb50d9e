//! The line-granular control protocol shared by daemon and client.
//!
//! One newline-terminated command per send, one response per reply, `|` as
//! the internal record separator. The client parses commands locally and
//! refuses to send malformed ones; the daemon parses again and answers an
//! error line when one arrives anyway.

use crate::error::{ProtocolError, find_similar};

/// Record separator inside responses.
pub const RESPONSE_SEP: char = '|';

const COMMANDS: &[&str] = &[
    "status", "start", "stop", "restart", "reread", "update", "tail", "shutdown",
];

#[derive(Debug, Clone, PartialEq, Eq, strum::EnumIs)]
pub enum Command {
    Status,
    Start(Vec<String>),
    Stop(Vec<String>),
    Restart(Vec<String>),
    Reread,
    Update,
    Tail { name: String, stream: OutputStream },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl Command {
    /// Parse a command line: space-separated tokens, verb lowercased,
    /// program names taken verbatim.
    pub fn parse(line: &str) -> Result<Command, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().unwrap_or_default().to_lowercase();
        let args: Vec<String> = tokens.map(str::to_string).collect();
        match verb.as_str() {
            "status" => no_args("status", &args).map(|_| Command::Status),
            "reread" => no_args("reread", &args).map(|_| Command::Reread),
            "update" => no_args("update", &args).map(|_| Command::Update),
            "shutdown" => no_args("shutdown", &args).map(|_| Command::Shutdown),
            "start" => names("start", args).map(Command::Start),
            "stop" => names("stop", args).map(Command::Stop),
            "restart" => names("restart", args).map(Command::Restart),
            "tail" => {
                let [name, stream] = args.as_slice() else {
                    return Err(ProtocolError::Usage {
                        usage: "tail <name> <stdout|stderr>".to_string(),
                    });
                };
                let stream = stream
                    .parse()
                    .map_err(|_| ProtocolError::InvalidStream {
                        stream: stream.clone(),
                    })?;
                Ok(Command::Tail {
                    name: name.clone(),
                    stream,
                })
            }
            unknown => Err(ProtocolError::UnknownCommand {
                command: unknown.to_string(),
                suggestion: find_similar(unknown, COMMANDS.iter().copied()),
            }),
        }
    }
}

fn no_args(verb: &str, args: &[String]) -> Result<(), ProtocolError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::Usage {
            usage: verb.to_string(),
        })
    }
}

fn names(verb: &str, args: Vec<String>) -> Result<Vec<String>, ProtocolError> {
    if args.is_empty() {
        Err(ProtocolError::Usage {
            usage: format!("{verb} <name> | all"),
        })
    } else {
        Ok(args)
    }
}
