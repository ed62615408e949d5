//! chatrelay CLI tool
//!
//! Sends chat lines to a relay or prints what it broadcasts.

use anyhow::{bail, Result};
use chatrelay_core::encode_frame;
use chatrelay_transport::{TransportEvent, TransportReceiver, TransportSender, WebSocketClient};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay-cli")]
#[command(about = "chatrelay CLI - send and watch chat traffic")]
#[command(version)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send each argument as one chat message
    Send {
        /// Messages to send
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Print every broadcast until the relay closes the connection
    Listen,
}

/// Strike `payload` off the messages still awaiting their broadcast.
///
/// Other clients' traffic is ignored. Identical text from someone else is
/// indistinguishable from ours and counts as the echo.
fn take_echo(pending: &mut Vec<&[u8]>, payload: &[u8]) -> bool {
    match pending.iter().position(|text| *text == payload) {
        Some(index) => {
            pending.remove(index);
            true
        }
        None => false,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (mut sender, mut receiver) = WebSocketClient::connect(&cli.url).await?;

    match cli.command {
        Commands::Send { texts } => {
            for text in &texts {
                sender.send(encode_frame(text.as_bytes())?).await?;
            }

            // Hang up only after every message has come back from the relay
            let mut pending: Vec<&[u8]> = texts.iter().map(|t| t.as_bytes()).collect();
            while !pending.is_empty() {
                match receiver.recv().await {
                    Some(TransportEvent::Data(data)) => {
                        take_echo(&mut pending, &data);
                    }
                    Some(TransportEvent::Connected) => {}
                    Some(TransportEvent::Disconnected { reason }) => {
                        bail!("relay closed the connection: {}", reason.unwrap_or_default())
                    }
                    None => bail!("relay connection lost"),
                }
            }
            println!("Sent {} message(s)", texts.len());

            sender.close().await?;
        }

        Commands::Listen => {
            println!("Listening on {}... (Ctrl+C to stop)\n", cli.url);

            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Some(TransportEvent::Data(data)) => {
                            println!("{}", String::from_utf8_lossy(&data));
                        }
                        Some(TransportEvent::Connected) => {}
                        Some(TransportEvent::Disconnected { .. }) | None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            sender.close().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_traffic_is_not_an_echo() {
        let mut pending: Vec<&[u8]> = vec![&b"hello"[..], &b"world"[..]];

        assert!(!take_echo(&mut pending, b"someone else"));
        assert_eq!(pending.len(), 2);

        assert!(take_echo(&mut pending, b"world"));
        assert_eq!(pending, vec![b"hello" as &[u8]]);

        assert!(take_echo(&mut pending, b"hello"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_repeated_text_needs_one_echo_each() {
        let mut pending: Vec<&[u8]> = vec![&b"hi"[..], &b"hi"[..]];

        assert!(take_echo(&mut pending, b"hi"));
        assert_eq!(pending.len(), 1);
        assert!(take_echo(&mut pending, b"hi"));
        assert!(!take_echo(&mut pending, b"hi"));
    }
}
