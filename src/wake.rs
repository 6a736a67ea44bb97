//! Wake-on-LAN signaling
//!
//! Builds and transmits the magic packet that powers on the sleeping backend.
//! Transmission is strictly best-effort: there is no acknowledgment at the
//! protocol level, so errors are only ever logged.

use std::fmt;
use std::str::FromStr;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// A 48-bit hardware (MAC) address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid MAC address '{0}' (expected six hex octets separated by ':' or '-')")]
pub struct ParseMacError(String);

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(ParseMacError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }

        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// Build a Wake-on-LAN magic packet: 6 bytes of 0xFF followed by the target
/// MAC repeated 16 times.
pub fn magic_packet(mac: MacAddr) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for rep in 0..16 {
        let start = 6 + rep * 6;
        packet[start..start + 6].copy_from_slice(&mac.octets());
    }
    packet
}

/// Sends wake signals toward a configured hardware address
#[derive(Debug, Clone)]
pub struct Waker {
    mac: MacAddr,
    broadcast: String,
    port: u16,
}

impl Waker {
    pub fn new(mac: MacAddr, broadcast: impl Into<String>, port: u16) -> Self {
        Self {
            mac,
            broadcast: broadcast.into(),
            port,
        }
    }

    /// Transmit one magic packet. The caller decides what to do with the
    /// outcome; delivery is never confirmed.
    pub async fn wake(&self) -> std::io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        let packet = magic_packet(self.mac);
        socket
            .send_to(&packet, (self.broadcast.as_str(), self.port))
            .await?;
        Ok(())
    }

    /// Fire a wake signal on a detached task. Errors are logged with the
    /// request's correlation id and swallowed; the response path never waits
    /// on this.
    pub fn spawn_wake(&self, request_id: String) {
        let waker = self.clone();
        tokio::spawn(async move {
            match waker.wake().await {
                Ok(()) => {
                    debug!(request_id, mac = %waker.mac, port = waker.port, "Wake packet sent");
                }
                Err(e) => {
                    warn!(request_id, mac = %waker.mac, error = %e, "Failed to send wake packet");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_separated() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn test_parse_dash_separated() {
        let mac: MacAddr = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_parse_uppercase() {
        let mac: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:zz".parse::<MacAddr>().is_err());
        assert!("aabb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let mac: MacAddr = "AA-0B-cC-1d-Ee-F0".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:0b:cc:1d:ee:f0");
    }

    #[test]
    fn test_magic_packet_layout() {
        let mac: MacAddr = "01:02:03:04:05:06".parse().unwrap();
        let packet = magic_packet(mac);

        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        for rep in 0..16 {
            let start = 6 + rep * 6;
            assert_eq!(&packet[start..start + 6], &[1, 2, 3, 4, 5, 6]);
        }
    }

    #[tokio::test]
    async fn test_wake_sends_packet_over_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let waker = Waker::new(mac, "127.0.0.1", port);
        waker.wake().await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receiver.recv_from(&mut buf),
        )
        .await
        .expect("timed out waiting for wake packet")
        .unwrap();

        assert_eq!(len, 102);
        assert_eq!(&buf[..102], &magic_packet(mac)[..]);
    }
}
