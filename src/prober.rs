use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::address::{self, Address};
use crate::classifier::{ConnectProbe, ProxyClassifier};
use crate::config::{CheckOptions, DEFAULT_PING_TIMEOUT};
use crate::dialer::DialStrategy;
use crate::dns::HostResolver;
use crate::error::CheckError;
use crate::models::CheckResult;
use crate::ping::{self, PingOutcome};
use crate::validator::{self, HttpFailure, PortOutcome};

/// Extra time the ping task gets on top of its own timeout before it is abandoned.
pub const PING_GRACE: Duration = Duration::from_secs(2);

/// Runs probes. Holds only immutable collaborators, so one instance can serve
/// any number of concurrent probes.
pub struct Prober {
    resolver: Arc<HostResolver>,
    classifier: Arc<dyn ProxyClassifier>,
}

impl Prober {
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(ConnectProbe::new()))
    }

    pub fn with_classifier(classifier: Arc<dyn ProxyClassifier>) -> Self {
        Self {
            resolver: Arc::new(HostResolver::from_system_conf(DEFAULT_PING_TIMEOUT)),
            classifier,
        }
    }

    /// Resolves `raw` and probes it.
    pub async fn check(&self, raw: &str, opts: &CheckOptions) -> Result<CheckResult, CheckError> {
        let address = address::resolve(raw)?;
        self.probe(&address, raw, opts).await
    }

    /// Pings `address` while checking its port (or URL, when proxied) and folds both
    /// outcomes into one result. Only proxy setup failures are returned as errors.
    pub async fn probe(
        &self,
        address: &Address,
        raw: &str,
        opts: &CheckOptions,
    ) -> Result<CheckResult, CheckError> {
        let strategy =
            DialStrategy::build_with(self.classifier.as_ref(), &opts.proxy_address, opts.port_timeout).await?;

        let client = match strategy.proxy_addr() {
            Some(proxy) if address.has_scheme() => Some((proxy.to_string(), http_client(&strategy, opts)?)),
            _ => None,
        };

        let ping_deadline = Instant::now() + opts.ping_timeout + PING_GRACE;
        let ping_rx = self.spawn_ping(address.host.clone(), opts);

        let port = match client {
            Some((proxy, client)) => PortOutcome::Http {
                proxy,
                outcome: check_http(&client, raw.trim()).await,
            },
            None => check_tcp(&strategy, address).await,
        };

        let ping = await_ping(ping_rx, ping_deadline).await;
        Ok(validator::classify(address, port, &ping))
    }

    fn spawn_ping(&self, host: String, opts: &CheckOptions) -> oneshot::Receiver<PingOutcome> {
        let (tx, rx) = oneshot::channel();
        let resolver = Arc::clone(&self.resolver);
        let count = opts.ping_count;
        let timeout = opts.ping_timeout;

        tokio::spawn(async move {
            let outcome = ping::measure_host(&resolver, &host, count, timeout).await;
            // The receiver is gone if the probe already gave up waiting.
            let _ = tx.send(outcome);
        });
        rx
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

fn http_client(strategy: &DialStrategy, opts: &CheckOptions) -> Result<reqwest::Client, CheckError> {
    let mut builder = reqwest::Client::builder()
        .timeout(opts.port_timeout)
        .redirect(Policy::none());
    if let Some(proxy) = strategy.http_proxy()? {
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| CheckError::ProxyUnavailable {
        addr: opts.proxy_address.clone(),
        reason: e.to_string(),
    })
}

async fn check_http(client: &reqwest::Client, url: &str) -> Result<u16, HttpFailure> {
    match client.get(url).send().await {
        Ok(response) => Ok(response.status().as_u16()),
        Err(e) => {
            let failure = HttpFailure::from_reqwest(&e);
            log::debug!("HTTP check of {} failed ({:?}): {}", url, failure.kind, failure.message);
            Err(failure)
        }
    }
}

async fn check_tcp(strategy: &DialStrategy, address: &Address) -> PortOutcome {
    match strategy.dial(address).await {
        Ok(stream) => {
            drop(stream);
            PortOutcome::Tcp {
                connected: true,
                error: None,
            }
        }
        Err(e) => {
            log::debug!("TCP check of {} failed: {}", address, e);
            PortOutcome::Tcp {
                connected: false,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Waits for the ping task until `deadline`. The task is not cancelled on expiry;
/// its result is simply dropped when it arrives.
async fn await_ping(rx: oneshot::Receiver<PingOutcome>, deadline: Instant) -> PingOutcome {
    match tokio::time::timeout_at(deadline, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => PingOutcome::Failed("ping task ended without a result".to_string()),
        Err(_) => {
            log::warn!("Ping did not finish before its deadline, reporting timeout");
            PingOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping::PingStats;

    #[tokio::test]
    async fn silent_ping_task_times_out() {
        let (_tx, rx) = oneshot::channel::<PingOutcome>();
        let outcome = await_ping(rx, Instant::now() + Duration::from_millis(50)).await;
        assert_eq!(outcome, PingOutcome::TimedOut);
    }

    #[tokio::test]
    async fn dropped_ping_task_is_a_failure() {
        let (tx, rx) = oneshot::channel::<PingOutcome>();
        drop(tx);
        let outcome = await_ping(rx, Instant::now() + Duration::from_secs(1)).await;
        assert!(matches!(outcome, PingOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn delivered_ping_outcome_is_used() {
        let (tx, rx) = oneshot::channel();
        let stats = PingStats {
            sent: 3,
            received: 3,
            avg_rtt: Some(Duration::from_millis(1)),
        };
        tx.send(PingOutcome::Completed(stats.clone())).unwrap();
        let outcome = await_ping(rx, Instant::now() + Duration::from_secs(1)).await;
        assert_eq!(outcome, PingOutcome::Completed(stats));
    }
}
