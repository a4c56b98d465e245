//! DNS latency probe using raw UDP packets.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use super::ProbeError;

/// Query `site`'s A record against the nameserver at `server` and return the
/// resolution latency in milliseconds.
pub async fn run_dns_probe(server: &str, site: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let server = server.to_string();
    let site = site.to_string();

    // Blocking UDP keeps the timing tight; one short-lived thread per lookup.
    tokio::task::spawn_blocking(move || query_blocking(&server, &site, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?
}

fn query_blocking(server: &str, site: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let target_addr = if server.contains(':') {
        server.to_string()
    } else {
        format!("{}:53", server)
    };

    let packet = build_dns_query(site)?;
    let tx_id = u16::from_be_bytes([packet[0], packet[1]]);

    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {}", e)))?;
    socket
        .connect(&target_addr)
        .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;

    let start = Instant::now();

    socket
        .send(&packet)
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

    let mut response = [0u8; 512];
    let n = socket.recv(&mut response).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(format!("failed to recv: {}", e))
        }
    })?;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    if n < 12 {
        return Err(ProbeError::Network(format!("response too short: {} bytes", n)));
    }

    let resp_tx_id = u16::from_be_bytes([response[0], response[1]]);
    if resp_tx_id != tx_id {
        return Err(ProbeError::Network(format!(
            "transaction ID mismatch: got {}, expected {}",
            resp_tx_id, tx_id
        )));
    }

    // RCODE is the lower 4 bits of byte 3.
    let rcode = response[3] & 0x0F;
    if rcode != 0 {
        return Err(ProbeError::Network(format!("DNS error RCODE: {}", rcode)));
    }

    Ok(elapsed_ms)
}

/// Build a minimal A-record query for `site`.
fn build_dns_query(site: &str) -> Result<Vec<u8>, ProbeError> {
    let tx_id: u16 = rand::random();
    let flags: u16 = 0x0100; // Standard query, recursion desired

    // Header (12 bytes)
    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    packet.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    // QNAME: length-prefixed labels
    for label in site.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ProbeError::Network(format!("invalid DNS label in {}", site)));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    // QTYPE: A (1), QCLASS: IN (1)
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dns_query() {
        let packet = build_dns_query("google.com").unwrap();
        // 12 (header) + 1+6 + 1+3 + 1 (root) + 4 (type/class)
        assert_eq!(packet.len(), 28);
        // QDCOUNT == 1
        assert_eq!(&packet[4..6], &[0, 1]);
        // First label is "google"
        assert_eq!(packet[12], 6);
        assert_eq!(&packet[13..19], b"google");
    }

    #[test]
    fn test_build_dns_query_trailing_dot() {
        let packet = build_dns_query("example.org.").unwrap();
        let plain = build_dns_query("example.org").unwrap();
        // Same layout apart from the random transaction ID.
        assert_eq!(packet[2..], plain[2..]);
    }

    #[test]
    fn test_build_dns_query_rejects_empty_label() {
        assert!(build_dns_query("bad..name").is_err());
    }
}
