use crate::error::{DumpError, Result};
use crate::key::PeerKey;
use crate::record::{AllowedIp, DeviceDump, DumpPeerRecord};
use chrono::{DateTime, Utc};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const PEER_FIELDS: usize = 8;
pub const DEVICE_FIELDS: usize = 4;

const NONE: &str = "(none)";
const OFF: &str = "off";

/// Field-level failure, turned into a [`DumpError`] once the line is known.
struct FieldError {
    field: &'static str,
    value: String,
    reason: String,
}

impl FieldError {
    fn new(field: &'static str, value: &str, reason: impl ToString) -> Self {
        Self {
            field,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn at(self, line: usize, content: &str) -> DumpError {
        DumpError::InvalidField {
            line,
            field: self.field,
            value: self.value,
            reason: self.reason,
            content: content.to_string(),
        }
    }
}

type FieldResult<T> = std::result::Result<T, FieldError>;

/// Decode peer lines of a dump.
///
/// Every line must hold exactly eight tab-separated fields. The first
/// malformed line fails the whole call; no partial result is returned.
/// Output order follows input order.
pub fn parse(raw: &[u8]) -> Result<Vec<DumpPeerRecord>> {
    let text = std::str::from_utf8(raw)?;
    parse_peer_lines(lines(text), 0)
}

/// Decode the output of `wg show <iface> dump`: an interface line with four
/// fields followed by peer lines.
pub fn parse_device_dump(raw: &[u8]) -> Result<DeviceDump> {
    let text = std::str::from_utf8(raw)?;
    let mut lines = lines(text);
    let header = lines.next().ok_or(DumpError::MissingDeviceHeader)?;

    let fields = split_exact(header, DEVICE_FIELDS, 1)?;
    let public_key = parse_key("public key", fields[1]).map_err(|e| e.at(1, header))?;
    let listen_port = fields[2]
        .parse::<u16>()
        .map_err(|e| FieldError::new("listen port", fields[2], e).at(1, header))?;
    let fwmark = match fields[3] {
        OFF => None,
        raw => Some(parse_fwmark(raw).map_err(|e| e.at(1, header))?),
    };

    let peers = parse_peer_lines(lines, 1)?;
    Ok(DeviceDump {
        public_key,
        listen_port,
        fwmark,
        peers,
    })
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    let empty = text.is_empty();
    text.split('\n')
        .filter(move |_| !empty)
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parse_peer_lines<'a, I>(lines: I, offset: usize) -> Result<Vec<DumpPeerRecord>>
where
    I: Iterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line_no = offset + idx + 1;
        out.push(parse_peer_line(line, line_no)?);
    }
    Ok(out)
}

fn split_exact(line: &str, expected: usize, line_no: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != expected {
        return Err(DumpError::FieldCount {
            line: line_no,
            expected,
            found: fields.len(),
            content: line.to_string(),
        });
    }
    Ok(fields)
}

fn parse_peer_line(line: &str, line_no: usize) -> Result<DumpPeerRecord> {
    let fields = split_exact(line, PEER_FIELDS, line_no)?;
    decode_peer_fields(&fields).map_err(|e| e.at(line_no, line))
}

fn decode_peer_fields(fields: &[&str]) -> FieldResult<DumpPeerRecord> {
    let public_key = parse_key("public key", fields[0])?;
    let preshared_key = match fields[1] {
        NONE => None,
        raw => Some(parse_key("preshared key", raw)?),
    };
    let endpoint = parse_endpoint(fields[2])?;
    let allowed_ips = parse_allowed_ips(fields[3])?;
    let last_handshake = parse_handshake(fields[4])?;
    let receive_bytes = parse_byte_count("received bytes", fields[5])?;
    let transmit_bytes = parse_byte_count("transmitted bytes", fields[6])?;
    let persistent_keepalive = parse_keepalive(fields[7])?;

    Ok(DumpPeerRecord {
        public_key,
        preshared_key,
        endpoint,
        allowed_ips,
        last_handshake,
        receive_bytes,
        transmit_bytes,
        persistent_keepalive,
    })
}

fn parse_key(field: &'static str, raw: &str) -> FieldResult<PeerKey> {
    raw.parse::<PeerKey>()
        .map_err(|e| FieldError::new(field, raw, e))
}

fn parse_endpoint(raw: &str) -> FieldResult<Option<SocketAddr>> {
    if raw == NONE {
        return Ok(None);
    }
    raw.parse::<SocketAddr>()
        .map(Some)
        .map_err(|e| FieldError::new("endpoint", raw, e))
}

fn parse_allowed_ips(raw: &str) -> FieldResult<Vec<AllowedIp>> {
    if raw.is_empty() {
        return Err(FieldError::new(
            "allowed ips",
            raw,
            "at least one allowed ip is required",
        ));
    }
    raw.split(',').map(parse_cidr).collect()
}

fn parse_cidr(raw: &str) -> FieldResult<AllowedIp> {
    let (addr_part, prefix_part) = raw
        .split_once('/')
        .ok_or_else(|| FieldError::new("allowed ip", raw, "must be CIDR notation (addr/prefix)"))?;
    let addr: IpAddr = addr_part
        .parse()
        .map_err(|e| FieldError::new("allowed ip", raw, e))?;
    let prefix: u8 = prefix_part
        .parse()
        .map_err(|e| FieldError::new("allowed ip", raw, e))?;
    AllowedIp::new(addr, prefix)
        .ok_or_else(|| FieldError::new("allowed ip", raw, "prefix exceeds address width"))
}

fn parse_handshake(raw: &str) -> FieldResult<Option<DateTime<Utc>>> {
    const FIELD: &str = "latest handshake unix timestamp";
    if raw == "0" {
        return Ok(None);
    }
    let secs: i64 = raw.parse().map_err(|e| FieldError::new(FIELD, raw, e))?;
    if secs < 0 {
        return Err(FieldError::new(FIELD, raw, "unexpected negative value"));
    }
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| FieldError::new(FIELD, raw, "timestamp out of range"))
}

fn parse_byte_count(field: &'static str, raw: &str) -> FieldResult<u64> {
    if raw.starts_with('-') {
        return Err(FieldError::new(field, raw, "unexpected negative value"));
    }
    raw.parse::<u64>().map_err(|e| FieldError::new(field, raw, e))
}

fn parse_keepalive(raw: &str) -> FieldResult<Duration> {
    const FIELD: &str = "persistent keepalive interval";
    if raw == OFF {
        return Ok(Duration::ZERO);
    }
    if raw.starts_with('-') {
        return Err(FieldError::new(FIELD, raw, "unexpected negative value"));
    }
    raw.parse::<u32>()
        .map(|secs| Duration::from_secs(secs as u64))
        .map_err(|e| FieldError::new(FIELD, raw, e))
}

fn parse_fwmark(raw: &str) -> FieldResult<u32> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|e| FieldError::new("fwmark", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    const VALID_DUMP: &str = include_str!("../testdata/dump.txt");
    const DEVICE_DUMP: &str = include_str!("../testdata/device-dump.txt");

    const KEY: &str = "GGSfJpzYq6kZqjuo3gmnOEm8VcyVzHM11tmUjcv0t4g=";
    const PSK: &str = "nTCEOb8Uk+Y2RR5qG0o7QgE9uIZZWaptomFgddtI6mU=";

    fn key(s: &str) -> PeerKey {
        s.parse().unwrap()
    }

    fn cidr(s: &str) -> AllowedIp {
        parse_cidr(s).ok().unwrap()
    }

    fn line(fields: [&str; 8]) -> String {
        fields.join("\t")
    }

    fn valid_fields() -> [&'static str; 8] {
        [
            KEY,
            PSK,
            "83.123.9.201:42944",
            "10.0.0.21/32",
            "1679600629",
            "7138444",
            "103247936",
            "off",
        ]
    }

    fn assert_rejected(raw: &str) {
        let result = parse(raw.as_bytes());
        assert!(result.is_err(), "expected rejection of {:?}", raw);
    }

    #[test]
    fn test_parse_valid_dump_file() {
        let peers = parse(VALID_DUMP.as_bytes()).unwrap();
        assert_eq!(peers.len(), 4);

        assert_eq!(
            peers[0],
            DumpPeerRecord {
                public_key: key(KEY),
                preshared_key: Some(key(PSK)),
                endpoint: None,
                allowed_ips: vec![cidr("10.0.0.19/32"), cidr("fdd0:438e:19ba:5069::13/128")],
                last_handshake: None,
                receive_bytes: 0,
                transmit_bytes: 0,
                persistent_keepalive: Duration::ZERO,
            }
        );

        assert_eq!(
            peers[1].endpoint,
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(83, 123, 9, 201),
                42944
            )))
        );
        assert_eq!(
            peers[1].last_handshake,
            DateTime::from_timestamp(1679600629, 0)
        );
        assert_eq!(peers[1].receive_bytes, 7138444);
        assert_eq!(peers[1].transmit_bytes, 103247936);

        assert_eq!(
            peers[2].endpoint,
            Some(SocketAddr::V6(SocketAddrV6::new(
                "2001:db8::7".parse::<Ipv6Addr>().unwrap(),
                51820,
                0,
                0
            )))
        );
        assert_eq!(peers[2].persistent_keepalive, Duration::from_secs(25));

        assert_eq!(peers[3].preshared_key, None);
        assert_eq!(
            peers[3].allowed_ips,
            vec![cidr("10.0.0.0/24"), cidr("192.168.7.0/24")]
        );
    }

    #[test]
    fn test_parse_preserves_line_order() {
        let peers = parse(VALID_DUMP.as_bytes()).unwrap();
        let keys: Vec<String> = peers.iter().map(|p| p.public_key.to_string()).collect();
        let expected: Vec<String> = VALID_DUMP
            .lines()
            .map(|l| l.split('\t').next().unwrap().to_string())
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_none_endpoint_zero_handshake_and_off_keepalive() {
        let mut fields = valid_fields();
        fields[2] = "(none)";
        fields[4] = "0";
        fields[7] = "off";
        let peers = parse(line(fields).as_bytes()).unwrap();

        assert_eq!(peers[0].endpoint, None);
        assert_eq!(peers[0].last_handshake, None);
        assert_eq!(peers[0].persistent_keepalive, Duration::ZERO);
    }

    #[test]
    fn test_empty_input_yields_no_peers() {
        assert!(parse(b"").unwrap().is_empty());
        assert!(parse(b"\n").unwrap().is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let raw = format!("{}\r\n{}\r\n", line(valid_fields()), line(valid_fields()));
        assert_eq!(parse(raw.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_reject_wrong_field_count() {
        assert_rejected(&valid_fields()[..7].join("\t"));
        assert_rejected(&format!("{}\textra", line(valid_fields())));

        let err = parse(b"just one field").unwrap_err();
        assert!(matches!(
            err,
            DumpError::FieldCount {
                line: 1,
                expected: 8,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_reject_blank_line_between_peers() {
        let raw = format!("{}\n\n{}\n", line(valid_fields()), line(valid_fields()));
        let err = parse(raw.as_bytes()).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_reject_invalid_fields() {
        let cases: [(usize, &str); 14] = [
            (0, "not-a-key"),
            (0, "L3bXbSsef2ZxWe7hxfu4+cnwF/Wuu3Q2MrVRSGbXvw=="),
            (1, "short"),
            (2, "83.123.9.201"),
            (2, "nowhere:port"),
            (3, ""),
            (3, "10.0.0.1"),
            (3, "10.0.0.0/33"),
            (3, "10.0.0.0/24,"),
            (4, "-1"),
            (4, "yesterday"),
            (5, "-100"),
            (6, "12x"),
            (7, "-25"),
        ];
        for (idx, value) in cases {
            let mut fields = valid_fields();
            fields[idx] = value;
            assert_rejected(&line(fields));
        }
    }

    #[test]
    fn test_one_bad_line_fails_whole_call() {
        let mut bad = valid_fields();
        bad[5] = "-1";
        let raw = format!(
            "{}\n{}\n{}\n",
            line(valid_fields()),
            line(bad),
            line(valid_fields())
        );

        let err = parse(raw.as_bytes()).unwrap_err();
        match err {
            DumpError::InvalidField {
                line, field, value, content, ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(field, "received bytes");
                assert_eq!(value, "-1");
                assert_eq!(content, self::line(bad));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reject_invalid_utf8() {
        assert!(matches!(parse(&[0xff, 0xfe]), Err(DumpError::Utf8(_))));
    }

    #[test]
    fn test_max_byte_counts() {
        let mut fields = valid_fields();
        fields[5] = "18446744073709551615";
        let peers = parse(line(fields).as_bytes()).unwrap();
        assert_eq!(peers[0].receive_bytes, u64::MAX);
    }

    #[test]
    fn test_parse_device_dump() {
        let device = parse_device_dump(DEVICE_DUMP.as_bytes()).unwrap();
        assert_eq!(
            device.public_key,
            key("4aUnLPVDkwbNyVHOqS/Jw6iey+yAzKM5Jqgssv/EemE=")
        );
        assert_eq!(device.listen_port, 51820);
        assert_eq!(device.fwmark, None);
        assert_eq!(device.peers, parse(VALID_DUMP.as_bytes()).unwrap());
    }

    #[test]
    fn test_device_dump_reports_absolute_line_numbers() {
        let mut bad = valid_fields();
        bad[3] = "garbage";
        let raw = format!(
            "{}\n{}\n",
            DEVICE_DUMP.lines().next().unwrap(),
            line(bad)
        );
        let err = parse_device_dump(raw.as_bytes()).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_device_dump_without_peers() {
        let header = DEVICE_DUMP.lines().next().unwrap().replace("\toff", "\t0xca6c");
        let device = parse_device_dump(header.as_bytes()).unwrap();
        assert!(device.peers.is_empty());
        assert_eq!(device.fwmark, Some(0xca6c));
    }

    #[test]
    fn test_empty_device_dump() {
        assert!(matches!(
            parse_device_dump(b""),
            Err(DumpError::MissingDeviceHeader)
        ));
    }
}
