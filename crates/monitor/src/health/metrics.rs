//! Prometheus text exposition parsing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Gauge a job exposes with the unix time of its last handled call.
pub const LAST_CALL_METRIC: &str = "last_call_timestamp";

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parse the text exposition format. Comments and blank lines are skipped;
/// the optional trailing timestamp is ignored.
pub fn parse_metrics(text: &str) -> Result<Vec<MetricSample>, String> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| parse_sample(line).map_err(|e| format!("line {}: {}", n, e)))
        .collect()
}

fn parse_sample(line: &str) -> Result<MetricSample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| format!("missing value in `{}`", line))?;
    let name = &line[..name_end];
    if name.is_empty() {
        return Err(format!("missing metric name in `{}`", line));
    }

    let (labels, rest) = if line[name_end..].starts_with('{') {
        parse_labels(&line[name_end + 1..])?
    } else {
        (BTreeMap::new(), &line[name_end..])
    };

    let value_text = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| format!("missing value for `{}`", name))?;

    Ok(MetricSample {
        name: name.to_string(),
        labels,
        value: parse_value(value_text)?,
    })
}

/// Parses `k="v",k2="v2"}` and returns the labels plus whatever follows `}`.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ' ' || c == ',');
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or("label without `=`")?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();
        rest = rest.strip_prefix('"').ok_or("label value must be quoted")?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let close = loop {
            match chars.next() {
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err("unterminated label value".to_string()),
                },
                Some((i, '"')) => break i,
                Some((_, c)) => value.push(c),
                None => return Err("unterminated label value".to_string()),
            }
        };
        labels.insert(key, value);
        rest = &rest[close + 1..];
    }
}

fn parse_value(text: &str) -> Result<f64, String> {
    match text {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        other => other
            .parse::<f64>()
            .map_err(|_| format!("invalid sample value `{}`", other)),
    }
}

/// The most recent last-call time across all `last_call_timestamp`
/// samples. Zero, negative or non-finite values mean "never called".
pub fn extract_last_activity(samples: &[MetricSample]) -> Option<DateTime<Utc>> {
    samples
        .iter()
        .filter(|s| s.name == LAST_CALL_METRIC)
        .map(|s| s.value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .and_then(|secs| {
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(whole, nanos)
        })
}
