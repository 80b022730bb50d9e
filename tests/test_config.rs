use overseer::config::{self, Autorestart, DEFAULT_PORT, StopSignal};
use overseer::error::ConfigError;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("overseer.yml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_full_document() {
    let dir = TempDir::new().unwrap();
    let stdout_log = dir.path().join("web.out.log");
    let contents = format!(
        r#"
server:
  port: 12010
programs:
  web:
    command: [/bin/sleep, "30"]
    autostart: false
    autorestart: unexpected
    restarts: 5
    kill_timeout: 2
    startup_wait: 1
    stop_signal: 2
    expected_exit: [0, 2]
    stdout_logfile: {}
    environment: ["MODE:production", "FLAGS:a:b:c"]
    dir: {}
    umask: 077
"#,
        stdout_log.display(),
        dir.path().display(),
    );
    let path = write_config(&dir, &contents);

    let settings = config::load(Some(path.as_path())).unwrap();
    assert_eq!(settings.port, 12010);
    assert_eq!(settings.path, path);

    let web = settings.programs.get("web").unwrap();
    assert_eq!(web.command, ["/bin/sleep", "30"]);
    assert!(!web.autostart);
    assert_eq!(web.autorestart, Autorestart::Unexpected);
    assert_eq!(web.restarts, 5);
    assert_eq!(web.kill_timeout, 2);
    assert_eq!(web.startup_wait, 1.0);
    assert_eq!(web.stop_signal, StopSignal::Sigint);
    assert_eq!(web.expected_exit, vec![0, 2]);
    assert_eq!(web.stdout_logfile.as_deref(), Some(stdout_log.as_path()));
    assert!(web.stderr_logfile.is_none());
    assert_eq!(web.environment.get("MODE").unwrap(), "production");
    assert_eq!(web.environment.get("FLAGS").unwrap(), "a:b:c");
    assert_eq!(web.dir.as_deref(), Some(dir.path()));
    assert_eq!(web.umask, 0o77);

    // the writability probe created the logfile
    assert!(stdout_log.exists());
}

#[test]
fn test_load_missing_explicit_path() {
    let err = config::load(Some(std::path::Path::new("/nonexistent/overseer.yml"))).unwrap_err();
    assert!(matches!(err, ConfigError::ReadError { .. }));
}

#[test]
fn test_invalid_yaml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "programs:\n  a:\n   command: [unclosed\n");
    let err = config::load(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn test_unwritable_logfile_rejected() {
    let dir = TempDir::new().unwrap();
    let missing_parent = dir.path().join("no-such-dir").join("out.log");
    let contents = format!(
        "programs:\n  a:\n    command: [/bin/true]\n    stdout_logfile: {}\n",
        missing_parent.display()
    );
    let path = write_config(&dir, &contents);
    let err = config::load(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::UnwritableLogfile { .. }));
}

#[test]
fn test_unenterable_dir_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "programs:\n  a:\n    command: [/bin/true]\n    dir: /nonexistent/workdir\n",
    );
    let err = config::load(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::BadDir { .. }));
}

#[test]
fn test_dev_null_logfile_is_acceptable() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "programs:\n  a:\n    command: [/bin/true]\n    stdout_logfile: /dev/null\n",
    );
    let settings = config::load(Some(path.as_path())).unwrap();
    assert_eq!(
        settings.programs.get("a").unwrap().stdout_logfile.as_deref(),
        Some(std::path::Path::new("/dev/null"))
    );
}

#[test]
fn test_invalid_stop_signal_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "programs:\n  a:\n    command: [/bin/true]\n    stop_signal: 11\n",
    );
    let err = config::load(Some(path.as_path())).unwrap_err();
    match err {
        ConfigError::InvalidValue { option, .. } => assert_eq!(option, "stop_signal"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_server_port_helper() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "server:\n  port: 12345\n");
    assert_eq!(config::server_port(Some(path.as_path())), 12345);

    // falls back to the default on unreadable or missing documents
    assert_eq!(
        config::server_port(Some(std::path::Path::new("/nonexistent/overseer.yml"))),
        DEFAULT_PORT
    );

    let path = write_config(&dir, "programs: {}\n");
    assert_eq!(config::server_port(Some(path.as_path())), DEFAULT_PORT);
}

/// Catalog size equals the sum of max(1, instances) over program configs.
#[test]
fn test_catalog_size_matches_instances() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
programs:
  pool:
    command: [/bin/sleep, "5"]
    instances: 4
  solo:
    command: [/bin/true]
"#,
    );
    let settings = config::load(Some(path.as_path())).unwrap();
    assert_eq!(settings.programs.len(), 5);
    for i in 0..4 {
        assert!(settings.programs.contains_key(&format!("pool({i})")));
    }
    assert!(settings.programs.contains_key("solo"));
}
