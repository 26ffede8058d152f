use netcheck::*;
use clap::Parser;
use std::time::Duration;
use anyhow::Result;

#[derive(Parser)]
#[command(name = "netcheck")]
#[command(about = "Ping a host and check whether a TCP port is reachable")]
struct Cli {
    host: String,

    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// HTTP-CONNECT or SOCKS5 proxy (host:port); the type is detected automatically
    #[arg(long)]
    proxy: Option<String>,

    #[arg(long, default_value_t = config::DEFAULT_PING_COUNT)]
    ping_count: u16,

    /// Seconds
    #[arg(long, default_value_t = 3)]
    ping_timeout: u64,

    /// Seconds
    #[arg(long, default_value_t = 3)]
    port_timeout: u64,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let opts = CheckOptions {
        ping_count: cli.ping_count,
        ping_timeout: Duration::from_secs(cli.ping_timeout),
        port_timeout: Duration::from_secs(cli.port_timeout),
        proxy_address: cli.proxy.unwrap_or_default(),
    };

    let host = cli.host.trim();
    let raw = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, cli.port)
    } else {
        format!("{}:{}", host, cli.port)
    };
    let address = address::resolve(&raw)?;

    let result = Prober::new().probe(&address, &raw, &opts).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("=== NetCheck Result ===");
    println!("Host: {}", result.host);
    println!("Port: {}", result.port);
    println!("Ping success: {}", result.ping_success);
    println!("Ping summary: {}", result.ping_summary);
    println!("Port success: {}", result.port_success);
    if let Some(error) = &result.port_error {
        println!("Port error: {}", error);
    }
    if result.http_checked {
        if let Some(status) = result.http_status {
            println!("HTTP status: {}", status);
        }
        if let Some(error) = &result.http_error {
            println!("HTTP error: {}", error);
        }
    }
    println!("Message: {}", result.message);

    Ok(())
}
