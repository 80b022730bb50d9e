#[macro_use]
extern crate log;

pub mod config;
pub mod ctl;
#[cfg(unix)]
pub mod daemonize;
pub mod env;
pub mod error;
pub mod logger;
pub mod program;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use miette::Result;
