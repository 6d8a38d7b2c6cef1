use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use display::{DisplayReceiver, PLACEHOLDER_TEXT};
use futures::{SinkExt, StreamExt};
use shared::protocol::ServerEvent;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

/// Terminal presentation surface for the lyrics control panel.
#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach to one surface, usually via the server's launch command
    /// (`presenter attach {url}`).
    Attach { url: String },
    /// Stay connected to the control stream and attach to every surface the
    /// server launches.
    Follow {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Attach { url } => {
            tokio::select! {
                result = attach(url) => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        Command::Follow { server } => {
            tokio::select! {
                result = follow(&server) => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
    }
}

/// Runs one surface until the controller closes it or the socket drops.
async fn attach(url: String) -> Result<()> {
    let (ws_stream, _) = connect_async(&url)
        .await
        .with_context(|| format!("failed to connect presentation socket: {url}"))?;
    info!(%url, "presentation surface attached");
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let mut listener = DisplayReceiver::new().listen(inbound_rx, Some(outbound_tx));

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_writer.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    show(PLACEHOLDER_TEXT);
    loop {
        tokio::select! {
            msg = ws_reader.next() => match msg {
                Some(Ok(Message::Text(frame))) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(error)) => {
                    warn!(%error, "presentation socket failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
            changed = listener.changed() => {
                if !changed {
                    break;
                }
                let text = listener.displayed();
                show(if text.is_empty() { PLACEHOLDER_TEXT } else { &text });
            }
        }
    }

    writer.abort();
    info!(%url, "presentation surface closed");
    Ok(())
}

async fn follow(server: &str) -> Result<()> {
    let events_url = control_url(server)?;
    let (ws_stream, _) = connect_async(events_url.as_str())
        .await
        .with_context(|| format!("failed to connect control socket: {events_url}"))?;
    info!(url = %events_url, "following display launches");
    let (_, mut ws_reader) = ws_stream.split();

    let mut current: Option<JoinHandle<()>> = None;
    while let Some(msg) = ws_reader.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(_) => continue,
            Err(error) => {
                warn!(%error, "control socket failed");
                break;
            }
        };
        let Ok(ServerEvent::DisplayLaunchRequested { url, .. }) =
            serde_json::from_str::<ServerEvent>(&text)
        else {
            continue;
        };

        if let Some(previous) = current.take() {
            previous.abort();
        }
        current = Some(tokio::spawn(async move {
            if let Err(error) = attach(url).await {
                warn!(%error, "failed to attach presentation surface");
            }
        }));
    }

    if let Some(previous) = current {
        previous.abort();
    }
    Ok(())
}

/// `http://host:port` becomes `ws://host:port/ws`.
fn control_url(server: &str) -> Result<Url> {
    let mut url = Url::parse(server).with_context(|| format!("invalid server url: {server}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("unsupported server scheme: {other}"),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("cannot derive websocket url from {server}");
    }
    url.set_path("/ws");
    url.set_query(None);
    Ok(url)
}

fn show(text: &str) {
    println!("{}", "-".repeat(40));
    println!("{text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_url_switches_scheme_and_path() {
        let url = control_url("http://127.0.0.1:8080").expect("url");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/ws");

        let url = control_url("https://stage.example.org/anything?x=1").expect("url");
        assert_eq!(url.as_str(), "wss://stage.example.org/ws");
    }

    #[test]
    fn control_url_rejects_other_schemes() {
        assert!(control_url("ftp://example.org").is_err());
        assert!(control_url("not a url").is_err());
    }
}
