//! Control server: a single-session TCP listener whose accept and recv
//! timeouts double as the monitor-tick schedule.
//!
//! All engine operations run on this one task, so commands, monitor ticks
//! and shutdown are serialized by construction.

use crate::protocol::Command;
use crate::supervisor::Supervisor;
use crate::{Result, env};
use miette::{IntoDiagnostic, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time;

enum SessionEnd {
    /// Client disconnected or sent an empty line; go back to accepting.
    Closed,
    /// Engine has already stopped everything; the daemon should exit now.
    Shutdown,
}

/// Bind the control port, autostart the catalog and serve until `shutdown`
/// or a termination signal. Binding failure (port in use) is fatal.
pub async fn serve(mut supervisor: Supervisor, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .into_diagnostic()
        .wrap_err(format!("failed to bind control port {port} (already in use?)"))?;
    info!("listening on 127.0.0.1:{port}");

    supervisor.init().await;

    let shutdown = Arc::new(Notify::new());
    #[cfg(unix)]
    register_signals(shutdown.clone())?;

    let accept_timeout = Duration::from_secs(*env::OVERSEER_ACCEPT_TIMEOUT_SECS);
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("received signal, stopping all programs");
                supervisor.shutdown().await;
                return Ok(());
            }
            accepted = time::timeout(accept_timeout, listener.accept()) => match accepted {
                Err(_elapsed) => supervisor.monitor_tick().await,
                Ok(Err(e)) => warn!("accept failed: {e}"),
                Ok(Ok((stream, addr))) => {
                    debug!("connection from {addr}");
                    match session(&mut supervisor, &shutdown, stream).await {
                        Ok(SessionEnd::Closed) => debug!("session closed by client"),
                        Ok(SessionEnd::Shutdown) => return Ok(()),
                        // transport error: the session ends, the engine is unaffected
                        Err(e) => warn!("session ended: {e}"),
                    }
                }
            },
        }
    }
}

async fn session(
    supervisor: &mut Supervisor,
    shutdown: &Notify,
    stream: TcpStream,
) -> std::io::Result<SessionEnd> {
    let recv_timeout = Duration::from_secs(*env::OVERSEER_RECV_TIMEOUT_SECS);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("received signal, stopping all programs");
                supervisor.shutdown().await;
                return Ok(SessionEnd::Shutdown);
            }
            line = time::timeout(recv_timeout, lines.next_line()) => match line {
                Err(_elapsed) => supervisor.monitor_tick().await,
                Ok(Ok(None)) => return Ok(SessionEnd::Closed),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(Some(line))) => {
                    let line = line.trim();
                    if line.is_empty() {
                        return Ok(SessionEnd::Closed);
                    }
                    debug!("received command: {line}");
                    match Command::parse(line) {
                        Ok(command) => {
                            let is_shutdown = command.is_shutdown();
                            let response = supervisor.dispatch(command).await;
                            send_response(&mut writer, &response).await?;
                            if is_shutdown {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        // bad command slipped past the client: answer an
                        // error line, change nothing
                        Err(e) => send_response(&mut writer, &e.to_string()).await?,
                    }
                }
            },
        }
    }
}

async fn send_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &str,
) -> std::io::Result<()> {
    trace!("sending response: {response}");
    writer.write_all(response.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Translate process-termination signals into one shutdown request. A
/// second signal while shutdown is in flight exits immediately.
#[cfg(unix)]
fn register_signals(shutdown: Arc<Notify>) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::signal::unix::{SignalKind, signal};

    static RECEIVED_SIGNAL: AtomicBool = AtomicBool::new(false);
    let kinds = [
        SignalKind::interrupt(),
        SignalKind::terminate(),
        SignalKind::quit(),
        SignalKind::hangup(),
    ];
    for kind in kinds {
        let mut stream = signal(kind).into_diagnostic()?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                stream.recv().await;
                if RECEIVED_SIGNAL.swap(true, Ordering::SeqCst) {
                    std::process::exit(1);
                }
                shutdown.notify_one();
            }
        });
    }
    Ok(())
}
