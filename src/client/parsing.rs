//! Parsing for `CLUSTER INFO` style `key:value` output.
//!
//! All parsing functions here are pure: same input always produces the same
//! output, with no I/O involved.

use std::collections::HashMap;

use regex::Regex;

use super::types::ParseError;

/// Parse key-value pairs from a `key:value` per-line info blob.
///
/// Empty lines and `#` section headers are skipped; lines that do not match
/// the `key:value` shape are ignored rather than treated as errors, because
/// servers add informational lines freely across versions.
pub fn parse_info_output(info: &str) -> Result<HashMap<String, String>, ParseError> {
    let kv_regex = Regex::new(r"^([\w-]+):(.+)$")
        .map_err(|e| ParseError::InvalidClusterInfo(format!("regex compilation: {e}")))?;

    let mut result = HashMap::new();

    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().to_string());
        }
    }

    Ok(result)
}

/// Parse a specific value from info output by key name.
pub fn parse_info_value(info: &str, key: &str) -> Option<String> {
    parse_info_output(info)
        .ok()
        .and_then(|map| map.get(key).cloned())
}

/// Parse an integer value from info output.
pub fn parse_info_int(info: &str, key: &str) -> Option<i64> {
    parse_info_value(info, key).and_then(|v| v.trim().parse().ok())
}

/// Parsed output of the `CLUSTER INFO` command.
///
/// Only the reporting node's own config epoch is interpreted here; everything
/// else stays available through the raw map.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    /// The reporting node's own config epoch (`cluster_my_epoch`).
    pub my_epoch: i64,
    /// All raw key-value pairs from the info output.
    pub raw: HashMap<String, String>,
}

impl ClusterInfo {
    /// Parse `CLUSTER INFO` output. `cluster_my_epoch` must be present and
    /// numeric; unknown keys are ignored.
    pub fn parse(info: &str) -> Result<Self, ParseError> {
        let raw = parse_info_output(info)?;

        let my_epoch = raw
            .get("cluster_my_epoch")
            .ok_or_else(|| ParseError::MissingField("cluster_my_epoch".to_string()))?
            .trim()
            .parse()
            .map_err(|_| {
                ParseError::InvalidClusterInfo("invalid cluster_my_epoch value".to_string())
            })?;

        Ok(ClusterInfo { my_epoch, raw })
    }
}
