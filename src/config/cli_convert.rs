//! Conversion helpers shared by the CLI and TOML layers

use anyhow::{Context, Result};
use std::time::Duration;

/// Parse a duration string (e.g., "500ms", "2s", "5m", "1h") to a Duration
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    let duration = match unit.trim() {
        "" | "s" | "sec" => Duration::from_secs(num),
        "ms" => Duration::from_millis(num),
        "us" => Duration::from_micros(num),
        "m" | "min" => Duration::from_secs(num * 60),
        "h" | "hr" => Duration::from_secs(num * 3600),
        other => anyhow::bail!("Unknown duration unit '{}' in: {}", other, s),
    };
    Ok(duration)
}

/// Render a Duration in the largest unit that represents it exactly
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        let secs = d.as_secs();
        if secs > 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs > 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    } else if d.as_micros() % 1000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}us", d.as_micros())
    }
}

/// Serde adapter for `Duration` fields written as strings
pub mod serde_duration {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `Duration` fields written as strings
pub mod serde_opt_duration {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| parse_duration(&raw))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
