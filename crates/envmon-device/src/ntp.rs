//! Minimal SNTP v4 client.

use std::net::UdpSocket;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::hal::{TimeSource, TimeSyncError};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

const PACKET_LEN: usize = 48;

/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0b00_100_011;

const MODE_SERVER: u8 = 4;

/// Queries one server over UDP port 123.
#[derive(Debug, Clone)]
pub struct SntpClient {
    server: String,
    timeout: Duration,
}

impl SntpClient {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }

    fn request(&self) -> Result<[u8; PACKET_LEN], TimeSyncError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.set_write_timeout(Some(self.timeout))?;
        socket.connect((self.server.as_str(), 123))?;

        let mut packet = [0u8; PACKET_LEN];
        packet[0] = CLIENT_HEADER;
        socket.send(&packet)?;

        let mut reply = [0u8; PACKET_LEN];
        let n = socket.recv(&mut reply)?;
        if n < PACKET_LEN {
            return Err(TimeSyncError::InvalidReply(format!("short reply of {} bytes", n)));
        }
        Ok(reply)
    }
}

impl TimeSource for SntpClient {
    fn fetch_utc(&self) -> Result<DateTime<Utc>, TimeSyncError> {
        let reply = self.request()?;
        let utc = parse_reply(&reply)?;
        debug!(server = %self.server, %utc, "SNTP reply");
        Ok(utc)
    }
}

/// Extract the transmit timestamp of a server reply.
pub fn parse_reply(reply: &[u8]) -> Result<DateTime<Utc>, TimeSyncError> {
    if reply.len() < PACKET_LEN {
        return Err(TimeSyncError::InvalidReply(format!(
            "expected {} bytes, got {}",
            PACKET_LEN,
            reply.len()
        )));
    }

    let mode = reply[0] & 0b111;
    if mode != MODE_SERVER {
        return Err(TimeSyncError::InvalidReply(format!("unexpected mode {}", mode)));
    }
    // Stratum 0 is a kiss-of-death packet
    if reply[1] == 0 {
        let code = String::from_utf8_lossy(&reply[12..16]).into_owned();
        return Err(TimeSyncError::InvalidReply(format!("kiss-of-death {}", code)));
    }

    let seconds = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]);
    let fraction = u32::from_be_bytes([reply[44], reply[45], reply[46], reply[47]]);
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;

    DateTime::from_timestamp(i64::from(seconds) - NTP_UNIX_OFFSET, nanos)
        .ok_or_else(|| TimeSyncError::InvalidReply("timestamp out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reply(seconds: u32, fraction: u32) -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0b00_100_100;
        packet[1] = 2;
        packet[40..44].copy_from_slice(&seconds.to_be_bytes());
        packet[44..48].copy_from_slice(&fraction.to_be_bytes());
        packet
    }

    #[test]
    fn test_parse_transmit_timestamp() {
        // 2024-03-01T12:00:00Z
        let seconds = (1_709_294_400_i64 + NTP_UNIX_OFFSET) as u32;
        let utc = parse_reply(&reply(seconds, 1 << 31)).unwrap();

        assert_eq!(
            utc,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_rejects_bad_replies() {
        assert!(parse_reply(&[0u8; 12]).is_err());

        let mut client_mode = reply(3_900_000_000, 0);
        client_mode[0] = CLIENT_HEADER;
        assert!(parse_reply(&client_mode).is_err());

        let mut kiss = reply(3_900_000_000, 0);
        kiss[1] = 0;
        kiss[12..16].copy_from_slice(b"RATE");
        match parse_reply(&kiss) {
            Err(TimeSyncError::InvalidReply(message)) => assert!(message.contains("RATE")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
