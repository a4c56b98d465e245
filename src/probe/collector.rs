//! Network collector: one fan-out/fan-in measurement cycle.

use std::time::Duration;

use tokio::task::JoinSet;

use super::{run_dns_probe, run_ping_burst};
use crate::config::Nameserver;
use crate::records::{DnsStat, ProbeResult, SiteStat};

/// Resolver timeout per nameserver lookup.
const DNS_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack on top of the burst duration before a ping run is abandoned.
const PING_GRACE: Duration = Duration::from_secs(30);

/// Collects ping and DNS statistics for the configured targets.
pub struct NetworkCollector {
    sites: Vec<String>,
    count: u32,
    dns_test_site: String,
    nameservers: Vec<Nameserver>,
}

impl NetworkCollector {
    pub fn new(
        sites: Vec<String>,
        count: u32,
        dns_test_site: String,
        nameservers: Vec<Nameserver>,
    ) -> Self {
        Self {
            sites,
            count,
            dns_test_site,
            nameservers,
        }
    }

    /// Run one collection cycle.
    ///
    /// All sites are pinged concurrently, then all nameservers are queried
    /// concurrently; the cycle waits for the slowest task before returning.
    /// A failed ping yields a failure-flagged entry; a failed DNS lookup is
    /// omitted from the cycle's results.
    pub async fn collect(&self) -> ProbeResult {
        let ping_timeout = Duration::from_secs_f64(self.count as f64 * 0.1) + PING_GRACE;

        let mut pings: JoinSet<SiteStat> = JoinSet::new();
        for site in self.sites.clone() {
            let count = self.count;
            pings.spawn(async move {
                // Stagger starts to avoid a thundering herd of bursts.
                let jitter = rand::random::<u64>() % 100;
                tokio::time::sleep(Duration::from_millis(jitter)).await;

                match run_ping_burst(&site, count, ping_timeout).await {
                    Ok(stats) => SiteStat {
                        site,
                        latency: stats.latency,
                        loss: stats.loss,
                        jitter: stats.jitter,
                    },
                    Err(e) => {
                        tracing::error!("Error pinging {}: {}", site, e);
                        SiteStat {
                            site,
                            latency: -1.0,
                            loss: 100.0,
                            jitter: -1.0,
                        }
                    }
                }
            });
        }

        let mut stats = Vec::with_capacity(self.sites.len());
        while let Some(joined) = pings.join_next().await {
            match joined {
                Ok(stat) => stats.push(stat),
                Err(e) => tracing::error!("Ping task panicked: {}", e),
            }
        }

        let mut lookups: JoinSet<Option<DnsStat>> = JoinSet::new();
        for ns in self.nameservers.clone() {
            let site = self.dns_test_site.clone();
            lookups.spawn(async move {
                match run_dns_probe(&ns.ip, &site, DNS_TIMEOUT).await {
                    Ok(latency) => Some(DnsStat {
                        nameserver: ns.name,
                        nameserver_ip: ns.ip,
                        kind: ns.kind,
                        latency,
                    }),
                    Err(e) => {
                        tracing::error!("Error resolving {} via {} ({}): {}", site, ns.name, ns.ip, e);
                        None
                    }
                }
            });
        }

        let mut dns_stats = Vec::with_capacity(self.nameservers.len());
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(Some(stat)) => dns_stats.push(stat),
                Ok(None) => {}
                Err(e) => tracing::error!("DNS task panicked: {}", e),
            }
        }

        ProbeResult { stats, dns_stats }
    }
}
