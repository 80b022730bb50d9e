//! Control client: a prompt loop that validates commands locally and
//! drives the daemon over a single TCP session.

use crate::Result;
use crate::protocol::{Command, RESPONSE_SEP};
use miette::IntoDiagnostic;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const PROMPT: &str = "> ";

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

/// Run the interactive prompt until EOF, `quit`/`exit` or `shutdown`.
pub async fn run(port: u16) -> Result<()> {
    let mut conn: Option<Connection> = None;
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = input.next_line().await.into_diagnostic()? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "quit" | "exit" => break,
            "version" => {
                println!("{}", env!("CARGO_PKG_VERSION"));
                continue;
            }
            _ => {}
        }
        // validate locally; malformed commands are never sent
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                if let Some(suggestion) = e.suggestion() {
                    println!("{suggestion}");
                }
                continue;
            }
        };
        match request(&mut conn, port, line).await {
            Ok(response) => {
                render(&response);
                if command.is_shutdown() {
                    break;
                }
            }
            Err(e) => {
                warn!("daemon is not responding: {e}");
                conn = None;
            }
        }
    }
    Ok(())
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{PROMPT}").into_diagnostic()?;
    stdout.flush().into_diagnostic()?;
    Ok(())
}

/// Send one command and read its single-line response, connecting lazily
/// and keeping the session open across commands.
async fn request(
    conn: &mut Option<Connection>,
    port: u16,
    line: &str,
) -> std::io::Result<String> {
    let mut c = match conn.take() {
        Some(c) => c,
        None => connect(port).await?,
    };
    debug!("sending to overseerd: {line}");
    c.writer.write_all(line.as_bytes()).await?;
    c.writer.write_all(b"\n").await?;
    c.writer.flush().await?;
    let response = c
        .lines
        .next_line()
        .await?
        .ok_or_else(|| std::io::Error::other("connection closed by daemon"))?;
    debug!("received from overseerd: {response}");
    *conn = Some(c);
    Ok(response)
}

async fn connect(port: u16) -> std::io::Result<Connection> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    debug!("connected to 127.0.0.1:{port}");
    let (reader, writer) = stream.into_split();
    Ok(Connection {
        lines: BufReader::new(reader).lines(),
        writer,
    })
}

/// Responses arrive as `|`-separated records, already padded by the
/// daemon; print one per line.
fn render(response: &str) {
    for record in response.split(RESPONSE_SEP).filter(|r| !r.is_empty()) {
        println!("{record}");
    }
}
