//! Datagram line parser
//!
//! A packet holds newline separated lines of the form
//! `key:value|type[|@rate][:value|type...]`. Each `value|type` bit after the
//! key is an independent update for that key.
//!
//! - `ms` is a timer sample
//! - `g` is a gauge
//! - anything else is a counter, optionally sample-rate corrected
//!
//! Bits that cannot be decoded are counted as bad lines and never forwarded.

use crate::metrics::MetricUpdate;

/// Result of decoding one datagram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPacket {
    pub updates: Vec<MetricUpdate>,
    pub bad_lines: usize,
}

pub fn parse_packet(packet: &[u8]) -> ParsedPacket {
    let mut parsed = ParsedPacket::default();
    let mut start = 0;

    for end in memchr::memchr_iter(b'\n', packet).chain(std::iter::once(packet.len())) {
        let line = trim_cr(&packet[start..end]);
        start = end + 1;
        if line.is_empty() {
            continue;
        }
        parse_line(line, &mut parsed);
    }

    parsed
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn parse_line(line: &[u8], parsed: &mut ParsedPacket) {
    let Ok(line) = std::str::from_utf8(line) else {
        parsed.bad_lines += 1;
        return;
    };

    let mut parts = line.split(':');
    let key = parts.next().unwrap_or_default();
    let mut bits = parts.peekable();

    if key.is_empty() || bits.peek().is_none() {
        parsed.bad_lines += 1;
        return;
    }

    for bit in bits {
        match parse_bit(key, bit) {
            Some(update) => parsed.updates.push(update),
            None => parsed.bad_lines += 1,
        }
    }
}

fn parse_bit(key: &str, bit: &str) -> Option<MetricUpdate> {
    let mut fields = bit.split('|');
    let value: f64 = fields.next()?.trim().parse().ok()?;
    let kind = fields.next()?;
    let rate = fields.next();

    if fields.next().is_some() || !value.is_finite() {
        return None;
    }

    let update = match kind {
        "ms" => MetricUpdate::Timer {
            key: key.to_string(),
            sample: value,
        },
        "g" => MetricUpdate::Gauge {
            key: key.to_string(),
            value,
        },
        _ => MetricUpdate::Counter {
            key: key.to_string(),
            delta: value,
            sample_rate: parse_sample_rate(rate)?,
        },
    };
    Some(update)
}

fn parse_sample_rate(field: Option<&str>) -> Option<f64> {
    let Some(field) = field else {
        return Some(1.0);
    };
    let field = field.strip_prefix('@').unwrap_or(field);
    let rate: f64 = field.trim().parse().ok()?;
    if rate.is_finite() && rate > 0.0 {
        Some(rate)
    } else {
        None
    }
}
