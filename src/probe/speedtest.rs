//! Bandwidth measurement via an external speedtest CLI.
//!
//! The measurement itself is the CLI's business; we only run it and parse
//! its JSON report.

use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use super::ProbeError;
use crate::records::SpeedTestResult;

/// JSON report of `speedtest-cli --json`. Throughput is bits per second.
#[derive(Debug, Deserialize)]
struct CliReport {
    download: Option<f64>,
    upload: Option<f64>,
    ping: Option<f64>,
}

/// Speed-test collector wrapping the configured CLI command.
pub struct SpeedTestCollector {
    command: String,
    timeout: Duration,
}

impl SpeedTestCollector {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Run one speed test and return the parsed result.
    pub async fn collect(&self) -> Result<SpeedTestResult, ProbeError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.command).arg("--json").output(),
        )
        .await
        .map_err(|_| ProbeError::Timeout(self.timeout))?
        .map_err(|e| ProbeError::Command(format!("failed to spawn {}: {}", self.command, e)))?;

        if !output.status.success() {
            return Err(ProbeError::Command(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }

        parse_cli_report(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the CLI's JSON report, converting throughput to Mbps.
fn parse_cli_report(stdout: &str) -> Result<SpeedTestResult, ProbeError> {
    let report: CliReport =
        serde_json::from_str(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    Ok(SpeedTestResult {
        download: report.download.map(bits_to_mbps),
        upload: report.upload.map(bits_to_mbps),
        latency: report.ping,
    })
}

fn bits_to_mbps(bits_per_sec: f64) -> f64 {
    bits_per_sec / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_report() {
        let stdout = r#"{"download": 183500000.0, "upload": 21400000.0, "ping": 14.2, "server": {"host": "x"}}"#;
        let result = parse_cli_report(stdout).unwrap();
        assert!((result.download.unwrap() - 183.5).abs() < 1e-9);
        assert!((result.upload.unwrap() - 21.4).abs() < 1e-9);
        assert_eq!(result.latency, Some(14.2));
    }

    #[test]
    fn test_parse_cli_report_missing_fields() {
        let result = parse_cli_report(r#"{"ping": 9.1}"#).unwrap();
        assert_eq!(result.download, None);
        assert_eq!(result.upload, None);
        assert_eq!(result.latency, Some(9.1));
    }

    #[test]
    fn test_parse_cli_report_garbage() {
        assert!(parse_cli_report("FAILED").is_err());
    }
}
