//! Gauge-family rendering for one scrape.

use prometheus::{GaugeVec, Opts, Registry};

use crate::records::{NameserverKind, ProbeResult, SpeedTestResult};
use crate::score::HealthReport;

/// Make a string usable inside a metric name.
pub fn safe_name(name: &str) -> String {
    name.replace([' ', '.', '-'], "_").to_lowercase()
}

fn metric_name(namespace: &str, family: &str) -> String {
    format!("{}_{}", namespace, safe_name(family))
}

/// Build the registry for one scrape.
///
/// Without a probe result there is nothing worth exposing and the registry
/// stays empty (the normal startup race). With one, every family is present
/// regardless of how much of the rest was available, so the exported set
/// keeps a stable shape across cycles.
pub fn render(
    device_id: &str,
    probe: Option<&ProbeResult>,
    speedtest: Option<&SpeedTestResult>,
    report: Option<&HealthReport>,
) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    let Some(probe) = probe else {
        return Ok(registry);
    };
    let namespace = safe_name(device_id);

    let network_stats = GaugeVec::new(
        Opts::new(
            metric_name(&namespace, "network_stats"),
            "Network statistics for latency and loss from the probe to the destination",
        ),
        &["type", "target"],
    )?;
    registry.register(Box::new(network_stats.clone()))?;
    for stat in &probe.stats {
        network_stats
            .with_label_values(&["latency", &stat.site])
            .set(stat.latency);
        network_stats
            .with_label_values(&["loss", &stat.site])
            .set(stat.loss);
        network_stats
            .with_label_values(&["jitter", &stat.site])
            .set(stat.jitter);
    }

    let dns_stats = GaugeVec::new(
        Opts::new(
            metric_name(&namespace, "dns_stats"),
            "DNS performance statistics for various DNS servers",
        ),
        &["server", "ip", "type"],
    )?;
    registry.register(Box::new(dns_stats.clone()))?;
    for stat in &probe.dns_stats {
        let kind = match stat.kind {
            NameserverKind::Internal => "internal",
            NameserverKind::External => "external",
        };
        dns_stats
            .with_label_values(&[&stat.nameserver, &stat.nameserver_ip, kind])
            .set(stat.latency);
    }

    if let Some(speedtest) = speedtest {
        let speed_stats = GaugeVec::new(
            Opts::new(
                metric_name(&namespace, "speed_stats"),
                "Bandwidth statistics from the speed test",
            ),
            &["type"],
        )?;
        registry.register(Box::new(speed_stats.clone()))?;
        for (label, value) in [
            ("download", speedtest.download),
            ("upload", speedtest.upload),
            ("latency", speedtest.latency),
        ] {
            if let Some(value) = value {
                speed_stats.with_label_values(&[label]).set(value);
            }
        }
    }

    let Some(report) = report else {
        return Ok(registry);
    };

    for (family, help, values) in [
        ("weight", "Network score weights", report.weights),
        ("threshold", "Network score thresholds", report.thresholds),
        ("coefficient", "Network score coefficients", report.coefficients),
    ] {
        let gauge = GaugeVec::new(
            Opts::new(metric_name(&namespace, family), help),
            &["type"],
        )?;
        registry.register(Box::new(gauge.clone()))?;
        for (label, value) in values.labeled() {
            gauge.with_label_values(&[label]).set(value);
        }
    }

    let health_score = GaugeVec::new(
        Opts::new(
            metric_name(&namespace, "health_score"),
            "Overall internet health function",
        ),
        &["type"],
    )?;
    registry.register(Box::new(health_score.clone()))?;
    for (label, value) in report.scores.labeled() {
        health_score.with_label_values(&[label]).set(value);
    }
    health_score
        .with_label_values(&["speedtest_overall"])
        .set(report.speedtest_overall_score);
    health_score
        .with_label_values(&["overall"])
        .set(report.overall_score);

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DnsStat, SiteStat};
    use crate::score::{self, Dimensions, ScoreConfig};
    use prometheus::proto::MetricFamily;

    fn sample_probe() -> ProbeResult {
        ProbeResult {
            stats: vec![SiteStat {
                site: "a.com".to_string(),
                latency: 20.0,
                loss: 0.0,
                jitter: 2.0,
            }],
            dns_stats: vec![DnsStat {
                nameserver: "Google".to_string(),
                nameserver_ip: "8.8.8.8".to_string(),
                kind: NameserverKind::External,
                latency: 12.0,
            }],
        }
    }

    fn sample_config() -> ScoreConfig {
        ScoreConfig {
            weights: Dimensions {
                loss: 0.6,
                latency: 0.15,
                jitter: 0.2,
                internal_dns_latency: 0.025,
                external_dns_latency: 0.025,
                speedtest_download: 0.0,
                speedtest_upload: 0.0,
            },
            thresholds: Dimensions {
                loss: 5.0,
                latency: 100.0,
                jitter: 30.0,
                internal_dns_latency: 30.0,
                external_dns_latency: 70.0,
                speedtest_download: 0.0,
                speedtest_upload: 0.0,
            },
        }
    }

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.get_name() == name)
            .unwrap_or_else(|| panic!("family {} missing", name))
    }

    fn gauge_with_label(f: &MetricFamily, label: &str, value: &str) -> f64 {
        f.get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == label && l.get_value() == value)
            })
            .unwrap_or_else(|| panic!("no {}={} in {}", label, value, f.get_name()))
            .get_gauge()
            .get_value()
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("My Device-1.home"), "my_device_1_home");
    }

    #[test]
    fn test_render_without_probe_is_empty() {
        let registry = render("netpulse", None, None, None).unwrap();
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn test_render_full_families() {
        let probe = sample_probe();
        let cfg = sample_config();
        let report = score::compute(Some(&probe), None, &cfg).unwrap();

        let registry = render("netpulse", Some(&probe), None, Some(&report)).unwrap();
        let families = registry.gather();

        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        for expected in [
            "netpulse_network_stats",
            "netpulse_dns_stats",
            "netpulse_weight",
            "netpulse_threshold",
            "netpulse_coefficient",
            "netpulse_health_score",
        ] {
            assert!(names.contains(&expected), "{} missing from {:?}", expected, names);
        }
        // Speed test was absent, so its raw family is too.
        assert!(!names.contains(&"netpulse_speed_stats"));

        let network = family(&families, "netpulse_network_stats");
        assert_eq!(gauge_with_label(network, "type", "latency"), 20.0);

        let coefficient = family(&families, "netpulse_coefficient");
        assert!((gauge_with_label(coefficient, "type", "latency") - 0.2).abs() < 1e-12);

        let health = family(&families, "netpulse_health_score");
        assert!((gauge_with_label(health, "type", "overall") - report.overall_score).abs() < 1e-12);
        // 7 dimensions + speedtest_overall + overall
        assert_eq!(health.get_metric().len(), 9);
    }

    #[test]
    fn test_render_includes_partial_speed_stats() {
        let probe = sample_probe();
        let speed = SpeedTestResult {
            download: Some(183.5),
            upload: None,
            latency: Some(14.2),
        };
        let cfg = sample_config();
        let report = score::compute(Some(&probe), Some(&speed), &cfg).unwrap();

        let registry = render("netpulse", Some(&probe), Some(&speed), Some(&report)).unwrap();
        let families = registry.gather();
        let speed_stats = family(&families, "netpulse_speed_stats");

        assert!((gauge_with_label(speed_stats, "type", "download") - 183.5).abs() < 1e-12);
        // Absent upload is simply not emitted.
        assert_eq!(speed_stats.get_metric().len(), 2);
    }
}
