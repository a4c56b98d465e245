//! Ping measurement via the system ping command.
//!
//! One invocation sends a burst of echo requests; the summary lines carry
//! loss, average RTT, and mdev (jitter) in a single parse.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use super::ProbeError;

/// Aggregate statistics from one ping burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    /// Average round-trip time in milliseconds.
    pub latency: f64,
    /// Packet loss percentage, 0-100.
    pub loss: f64,
    /// mdev of the round trips in milliseconds.
    pub jitter: f64,
}

/// Run a ping burst against `site` and parse the summary statistics.
pub async fn run_ping_burst(
    site: &str,
    count: u32,
    timeout: Duration,
) -> Result<PingStats, ProbeError> {
    let output = tokio::time::timeout(
        timeout,
        Command::new("ping")
            .arg("-n")
            .arg("-i")
            .arg("0.1")
            .arg("-c")
            .arg(count.to_string())
            .arg(site)
            .output(),
    )
    .await
    .map_err(|_| ProbeError::Timeout(timeout))?
    .map_err(|e| ProbeError::Command(format!("failed to spawn ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ping_summary(&stdout)
}

/// Parse the loss and rtt summary lines of ping output.
///
/// ```text
/// 10 packets transmitted, 10 received, 0% packet loss, time 9011ms
/// rtt min/avg/max/mdev = 11.487/12.915/14.475/1.095 ms
/// ```
pub fn parse_ping_summary(output: &str) -> Result<PingStats, ProbeError> {
    static LOSS_RE: OnceLock<Regex> = OnceLock::new();
    let loss_re = LOSS_RE.get_or_init(|| Regex::new(r"([\d.]+)% packet loss").unwrap());

    static RTT_RE: OnceLock<Regex> = OnceLock::new();
    let rtt_re = RTT_RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)/([0-9.]+)\s*ms",
        )
        .unwrap()
    });

    let loss = loss_re
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Parse(format!("no loss summary in ping output: {}", output)))?;

    // With 100% loss there is no rtt line at all; that is still a valid
    // (fully lost) measurement, not a parse failure.
    match rtt_re.captures(output) {
        Some(caps) => {
            let avg = caps[2]
                .parse::<f64>()
                .map_err(|e| ProbeError::Parse(e.to_string()))?;
            let mdev = caps[4]
                .parse::<f64>()
                .map_err(|e| ProbeError::Parse(e.to_string()))?;
            Ok(PingStats {
                latency: avg,
                loss,
                jitter: mdev,
            })
        }
        None if loss >= 100.0 => Ok(PingStats {
            latency: -1.0,
            loss,
            jitter: -1.0,
        }),
        None => Err(ProbeError::Parse(format!(
            "no rtt summary in ping output: {}",
            output
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary_linux() {
        let output = r#"PING google.com (142.250.72.14) 56(84) bytes of data.

--- google.com ping statistics ---
10 packets transmitted, 10 received, 0% packet loss, time 9011ms
rtt min/avg/max/mdev = 11.487/12.915/14.475/1.095 ms"#;
        let stats = parse_ping_summary(output).unwrap();
        assert_eq!(stats.loss, 0.0);
        assert!((stats.latency - 12.915).abs() < 1e-9);
        assert!((stats.jitter - 1.095).abs() < 1e-9);
    }

    #[test]
    fn test_parse_summary_macos() {
        let output = r#"--- 8.8.8.8 ping statistics ---
5 packets transmitted, 5 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 17.906/18.234/19.001/0.412 ms"#;
        let stats = parse_ping_summary(output).unwrap();
        assert_eq!(stats.loss, 0.0);
        assert!((stats.latency - 18.234).abs() < 1e-9);
    }

    #[test]
    fn test_parse_summary_total_loss() {
        let output = r#"--- 10.0.0.99 ping statistics ---
10 packets transmitted, 0 received, 100% packet loss, time 9212ms"#;
        let stats = parse_ping_summary(output).unwrap();
        assert_eq!(stats.loss, 100.0);
        assert_eq!(stats.latency, -1.0);
        assert_eq!(stats.jitter, -1.0);
    }

    #[test]
    fn test_parse_summary_partial_loss() {
        let output = r#"10 packets transmitted, 7 received, 30% packet loss, time 9112ms
rtt min/avg/max/mdev = 20.100/25.500/31.200/3.400 ms"#;
        let stats = parse_ping_summary(output).unwrap();
        assert_eq!(stats.loss, 30.0);
        assert!((stats.jitter - 3.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_ping_summary("ping: unknown host nowhere.invalid").is_err());
    }
}
