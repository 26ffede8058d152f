use std::net::IpAddr;
use std::time::Duration;

use futures::future::join_all;
use socket2::Type;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use tokio::time::Instant;

use crate::dns::HostResolver;
use crate::error::PingError;

const PAYLOAD: [u8; 56] = [0; 56];
const INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub avg_rtt: Option<Duration>,
}

impl PingStats {
    pub fn packet_loss(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        (self.sent - self.received) as f64 * 100.0 / self.sent as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    Completed(PingStats),
    Failed(String),
    /// Nothing arrived before the join ceiling.
    TimedOut,
}

impl PingOutcome {
    pub fn success(&self) -> bool {
        match self {
            PingOutcome::Completed(stats) => stats.packet_loss() < 100.0,
            _ => false,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            PingOutcome::Completed(stats) => {
                let rtt = stats
                    .avg_rtt
                    .map(|rtt| format!("{:.2}ms", rtt.as_secs_f64() * 1000.0))
                    .unwrap_or_else(|| "n/a".to_string());
                format!(
                    "{} packets transmitted, {} received, {:.1}% packet loss, avg rtt {}",
                    stats.sent,
                    stats.received,
                    stats.packet_loss(),
                    rtt
                )
            }
            PingOutcome::Failed(e) => format!("error: {}", e),
            PingOutcome::TimedOut => "timeout".to_string(),
        }
    }
}

/// Resolves `host` and pings it. Every failure is folded into the outcome.
pub async fn measure_host(resolver: &HostResolver, host: &str, count: u16, timeout: Duration) -> PingOutcome {
    let ip = match resolver.resolve(host).await {
        Ok(ip) => ip,
        Err(e) => {
            log::debug!("Ping of {} skipped: {}", host, e);
            return PingOutcome::Failed(e.to_string());
        }
    };

    match measure(ip, count, timeout).await {
        Ok(stats) => PingOutcome::Completed(stats),
        Err(e) => {
            log::debug!("Ping of {} ({}) failed: {}", host, ip, e);
            PingOutcome::Failed(e.to_string())
        }
    }
}

/// Sends `count` echo requests from an unprivileged (datagram) ICMP socket, one every
/// `INTERVAL`, without waiting for earlier replies. Every reply wait ends at the overall
/// `timeout`; requests that would be due after it are not sent.
pub async fn measure(ip: IpAddr, count: u16, timeout: Duration) -> Result<PingStats, PingError> {
    let kind = if ip.is_ipv6() { ICMP::V6 } else { ICMP::V4 };
    let config = Config::builder().kind(kind).sock_type_hint(Type::DGRAM).build();
    let client = Client::new(&config)?;
    let ident = PingIdentifier(rand::random());

    let start = Instant::now();
    let deadline = start + timeout;
    let mut echoes = Vec::with_capacity(usize::from(count.max(1)));

    for seq in 0..count.max(1) {
        let due = start + INTERVAL * u32::from(seq);
        if seq > 0 && due >= deadline {
            break;
        }
        let mut pinger = client.pinger(ip, ident).await;
        echoes.push(async move {
            tokio::time::sleep_until(due).await;
            pinger.timeout(deadline.saturating_duration_since(Instant::now()));
            match pinger.ping(PingSequence(seq), &PAYLOAD).await {
                Ok((_, rtt)) => Some(rtt),
                Err(e) => {
                    log::debug!("icmp_seq={} to {}: {}", seq, ip, e);
                    None
                }
            }
        });
    }

    let sent = echoes.len() as u32;
    let rtts: Vec<Duration> = join_all(echoes).await.into_iter().flatten().collect();
    let received = rtts.len() as u32;

    Ok(PingStats {
        sent,
        received,
        avg_rtt: (received > 0).then(|| rtts.iter().sum::<Duration>() / received),
    })
}
