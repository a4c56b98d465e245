//! Typed measurement records.
//!
//! These are the shapes written to and read back from the datastore. They are
//! validated at that boundary: a stored payload either deserializes into one
//! of these structs or is treated as absent.

use serde::{Deserialize, Serialize};

/// Per-site ping statistics for one collection cycle.
///
/// Latency and jitter are milliseconds, loss is a 0-100 percentage. A value
/// of `-1.0` marks a failed measurement; a fully lost round is recorded with
/// `loss = 100.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStat {
    pub site: String,
    pub latency: f64,
    pub loss: f64,
    pub jitter: f64,
}

/// Whether a nameserver sits inside the local network or out on the internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameserverKind {
    Internal,
    External,
}

/// Resolution latency against a single nameserver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsStat {
    pub nameserver: String,
    pub nameserver_ip: String,
    #[serde(rename = "type")]
    pub kind: NameserverKind,
    /// Milliseconds.
    pub latency: f64,
}

/// One cycle's worth of network measurements.
///
/// Both lists may be empty; consumers guard their averages accordingly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub stats: Vec<SiteStat>,
    pub dns_stats: Vec<DnsStat>,
}

/// Bandwidth measurement. Download/upload are Mbps, latency is milliseconds.
///
/// The whole record is optional downstream and so is each field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub download: Option<f64>,
    pub upload: Option<f64>,
    pub latency: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_wire_format() {
        let result = ProbeResult {
            stats: vec![SiteStat {
                site: "a.com".to_string(),
                latency: 20.0,
                loss: 0.0,
                jitter: 2.0,
            }],
            dns_stats: vec![DnsStat {
                nameserver: "Quad9".to_string(),
                nameserver_ip: "9.9.9.9".to_string(),
                kind: NameserverKind::External,
                latency: 12.5,
            }],
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stats"][0]["site"], "a.com");
        assert_eq!(json["dns_stats"][0]["nameserver_ip"], "9.9.9.9");
        // The kind discriminator is stored under the legacy field name.
        assert_eq!(json["dns_stats"][0]["type"], "external");

        let back: ProbeResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_speedtest_nulls() {
        let parsed: SpeedTestResult =
            serde_json::from_str(r#"{"download": null, "upload": 102.4, "latency": null}"#)
                .unwrap();
        assert_eq!(parsed.download, None);
        assert_eq!(parsed.upload, Some(102.4));
        assert_eq!(parsed.latency, None);
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        // A partially valid structure must not deserialize into garbage.
        let err = serde_json::from_str::<ProbeResult>(r#"{"stats": [{"site": 3}]}"#);
        assert!(err.is_err());
    }
}
