//! `tether`: run an echo or chat server, ping a server, or send it one
//! message.

mod apps;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tether_net::{Client, ClientConfig, Server, ServerConfig};
use tether_telemetry::{init_logging, TelemetryConfig};
use tether_wire::Request;
use tracing::info;

/// Tether: integrity-checked messaging over TCP
#[derive(Parser, Debug)]
#[command(name = "tether", version)]
#[command(about = "Run a Tether server or talk to one")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an echo server (or a chat server with --chat) until Ctrl+C
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        #[arg(long, default_value_t = 2)]
        max_clients: usize,

        /// Relay messages between clients instead of echoing them
        #[arg(long)]
        chat: bool,
    },

    /// Measure round-trip times to a server
    Ping {
        #[arg(short, long, default_value = "127.0.0.1")]
        server: String,

        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        #[arg(short, long, default_value_t = 4)]
        count: u32,

        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Send one message and optionally wait for the reply
    Send {
        #[arg(short, long, default_value = "127.0.0.1")]
        server: String,

        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        #[arg(short, long)]
        message: String,

        /// Wait this long for a correlated reply (0 sends and exits)
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&TelemetryConfig::for_service("tether", "info"))
        .context("Failed to initialize logging")?;

    match args.command {
        Command::Serve {
            host,
            port,
            max_clients,
            chat,
        } => serve(host, port, max_clients, chat).await,
        Command::Ping {
            server,
            port,
            count,
            timeout_ms,
        } => ping(server, port, count, Duration::from_millis(timeout_ms)).await,
        Command::Send {
            server,
            port,
            message,
            wait_ms,
        } => send(server, port, message, Duration::from_millis(wait_ms)).await,
    }
}

async fn serve(host: String, port: u16, max_clients: usize, chat: bool) -> Result<()> {
    let config = ServerConfig {
        name: if chat { "chat" } else { "echo" }.to_string(),
        host,
        port,
        max_clients,
        ..ServerConfig::from_env()
    };
    let server = Server::new(config, apps::registry()?);
    if chat {
        apps::install_chat(&server);
    } else {
        apps::install_echo(&server);
    }

    let addr = server.start().await.context("Failed to start server")?;
    info!(addr = %addr, "Server is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    server.close_all().await;
    Ok(())
}

fn client_config(server: String, port: u16) -> ClientConfig {
    ClientConfig {
        name: "cli".to_string(),
        server_address: server,
        port,
        ..ClientConfig::from_env()
    }
}

async fn ping(server: String, port: u16, count: u32, timeout: Duration) -> Result<()> {
    let client = Client::new(client_config(server, port), apps::registry()?);
    client.connect().await.context("Failed to connect")?;

    let mut answered = 0;
    for seq in 1..=count {
        match client.ping_server(timeout).await? {
            Some(pong) => {
                answered += 1;
                println!("pong seq={seq} time={}ms", pong.latency());
            }
            None => println!("no pong seq={seq} (timeout {}ms)", timeout.as_millis()),
        }
        if seq < count {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    client.disconnect().await;

    println!("{count} sent, {answered} answered");
    if answered == 0 && count > 0 {
        bail!("server did not answer any ping");
    }
    Ok(())
}

async fn send(server: String, port: u16, message: String, wait: Duration) -> Result<()> {
    let client = Client::new(client_config(server, port), apps::registry()?);
    client.connect().await.context("Failed to connect")?;

    let request = Request::new(apps::ECHO, message);
    if wait.is_zero() {
        client.send(&request).await?;
    } else {
        match client.send_and_wait(&request, wait).await? {
            Some(reply) => println!(
                "{} ({} bytes, {}ms, id {})",
                reply.text(),
                reply.content().len(),
                reply.latency(),
                reply.correlation_id().short()
            ),
            None => println!("no reply within {}ms", wait.as_millis()),
        }
    }

    client.disconnect().await;
    Ok(())
}
