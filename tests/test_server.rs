//! End-to-end control sessions over a real TCP socket.

use indexmap::IndexMap;
use overseer::config::{ProgramConfig, Settings};
use overseer::server;
use overseer::supervisor::Supervisor;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::sleep;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn connect(port: u16) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            let (reader, writer) = stream.into_split();
            return (BufReader::new(reader).lines(), writer);
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("control server did not come up on port {port}");
}

async fn roundtrip(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    command: &str,
) -> String {
    writer.write_all(command.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
    lines.next_line().await.unwrap().expect("daemon hung up")
}

#[tokio::test]
async fn test_control_session_over_tcp() {
    let port = free_port().await;
    let mut config = ProgramConfig::new("a", vec!["/bin/sleep".to_string(), "30".to_string()]);
    config.startup_wait = 0.05;
    let settings = Settings {
        path: PathBuf::from("/nonexistent/overseer.yml"),
        port,
        programs: [("a".to_string(), config)].into_iter().collect::<IndexMap<_, _>>(),
    };
    let supervisor = Supervisor::new(settings);
    let handle = tokio::spawn(server::serve(supervisor, port));

    let (mut lines, mut writer) = connect(port).await;

    let response = roundtrip(&mut lines, &mut writer, "status").await;
    assert!(response.starts_with("a "));
    assert!(response.contains("RUNNING"));

    // an unknown command yields an error line without state change
    let response = roundtrip(&mut lines, &mut writer, "bogus").await;
    assert_eq!(response, "Command not found: bogus");
    let response = roundtrip(&mut lines, &mut writer, "status").await;
    assert!(response.contains("RUNNING"));

    let response = roundtrip(&mut lines, &mut writer, "stop a").await;
    assert_eq!(response, "stopped a successfully|");

    // an empty line ends the session; the daemon goes back to listening
    writer.write_all(b"\n").await.unwrap();
    writer.flush().await.unwrap();
    assert_eq!(lines.next_line().await.unwrap(), None);

    let (mut lines, mut writer) = connect(port).await;
    let response = roundtrip(&mut lines, &mut writer, "start a").await;
    assert_eq!(response, "a started successfully|");

    let response = roundtrip(&mut lines, &mut writer, "shutdown").await;
    assert_eq!(response, "Shut down overseerd successfully");

    handle.await.unwrap().unwrap();
}
