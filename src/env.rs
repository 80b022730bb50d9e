use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_default());
pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| dirs::home_dir().unwrap_or_default());

pub static OVERSEER_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("OVERSEER_STATE_DIR").unwrap_or(
        dirs::state_dir()
            .unwrap_or(HOME_DIR.join(".local").join("state"))
            .join("overseer"),
    )
});
pub static OVERSEER_LOG_FILE: Lazy<PathBuf> =
    Lazy::new(|| OVERSEER_STATE_DIR.join("overseerd.log"));
pub static OVERSEER_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("OVERSEER_LOG").unwrap_or(log::LevelFilter::Info));

/// Ordered list of configuration file locations probed when `-c` is not given.
pub static CONFIG_SEARCH_PATHS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        CWD.join("overseer.yml"),
        dirs::config_dir()
            .unwrap_or(HOME_DIR.join(".config"))
            .join("overseer")
            .join("overseer.yml"),
        PathBuf::from("/etc/overseer/overseer.yml"),
    ]
});

/// Accept timeout on the listen socket; expiry runs a monitor tick.
pub static OVERSEER_ACCEPT_TIMEOUT_SECS: Lazy<u64> =
    Lazy::new(|| var_u64("OVERSEER_ACCEPT_TIMEOUT_SECS").unwrap_or(3));
/// Recv timeout inside a client session; expiry runs a monitor tick.
pub static OVERSEER_RECV_TIMEOUT_SECS: Lazy<u64> =
    Lazy::new(|| var_u64("OVERSEER_RECV_TIMEOUT_SECS").unwrap_or(10));

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}

fn var_u64(name: &str) -> Option<u64> {
    var(name).ok().and_then(|val| val.parse().ok())
}
