//! Terminal chat client for an Endstate server.
//!
//! Reads lines from stdin and prints the conversation as it streams in.
//! `/reset` clears the session, `/quit` exits.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{fmt, EnvFilter};

use endstate_client::{session_file, ChatClient, ClientError, Subscriber, SubscriberConfig};
use endstate_core::{ChatEvent, Role, SessionId};

#[derive(Parser)]
#[command(name = "endstate-chat")]
#[command(about = "Chat with the Endstate tutor from a terminal")]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "ENDSTATE_SERVER", default_value = "http://localhost:8000")]
    server: String,

    /// Session id. Defaults to the one stored in --session-file.
    #[arg(long)]
    session: Option<String>,

    /// Where the generated session id is kept between runs.
    #[arg(long, default_value = ".endstate-session")]
    session_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let session_id = match cli.session.as_deref() {
        Some(raw) => SessionId::parse(raw)?,
        None => session_file::load_or_create(&cli.session_file)?,
    };
    eprintln!("session {session_id} on {}", cli.server);

    let client = ChatClient::new(cli.server, session_id);
    let (updates_tx, mut updates_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let subscriber = Subscriber::new(client.clone(), SubscriberConfig::default());
    let subscription = tokio::spawn(subscriber.run(updates_tx, shutdown_rx));
    let printer = tokio::spawn(async move {
        while let Some(event) = updates_rx.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => match client.reset().await {
                Ok(cleared) => eprintln!("cleared {cleared} messages"),
                Err(e) => eprintln!("reset failed: {e}"),
            },
            content => match client.send(content).await {
                Ok(_) => {}
                Err(ClientError::Busy(reason)) => eprintln!("still thinking ({reason}); try again shortly"),
                Err(e) => eprintln!("send failed: {e}"),
            },
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = subscription.await;
    let _ = printer.await;
    Ok(())
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::InitialMessages { messages, .. } => {
            for message in messages {
                println!("{}: {}", speaker(message.role), message.content);
            }
        }
        ChatEvent::MessageAdded { message } if message.role == Role::Assistant => {
            println!("{}: {}", speaker(message.role), message.content);
        }
        ChatEvent::ProcessingStarted { .. } => eprintln!("..."),
        ChatEvent::ProcessingCancelled { .. } => eprintln!("(cancelled)"),
        ChatEvent::Error { message, .. } => eprintln!("error: {message}"),
        _ => {}
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "tutor",
        Role::System => "system",
    }
}
