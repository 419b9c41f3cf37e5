//! Parsers for the `=ybegin`, `=ypart` and `=yend` marker lines.

use std::collections::HashMap;

/// Parsed `=ybegin` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct YBegin {
    /// Encoded line length hint
    pub line: Option<u32>,
    /// Size of the whole decoded file
    pub size: u64,
    /// Output filename as posted (not yet sanitized)
    pub name: String,
    /// Part index, present only for multi-part files
    pub part: Option<u32>,
    /// Part count, present only for multi-part files
    pub total: Option<u32>,
}

/// Parsed `=ypart` line; offsets are 1-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YPart {
    pub begin: u64,
    pub end: u64,
}

/// Parsed `=yend` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YEnd {
    /// Decoded size of this part (or of the whole file when single-part)
    pub size: u64,
    pub part: Option<u32>,
    /// Checksum of this part's decoded bytes
    pub pcrc32: Option<u32>,
    /// Checksum of the whole file
    pub crc32: Option<u32>,
}

pub(crate) const YBEGIN: &str = "=ybegin ";
pub(crate) const YPART: &str = "=ypart ";
pub(crate) const YEND: &str = "=yend";

/// Parse `=ybegin line=128 size=123456 [part=1 total=5] name=file.bin`
///
/// `name` is always the last keyword and runs to the end of the line, so
/// filenames may contain spaces and `=`.
pub(crate) fn parse_ybegin(line: &str) -> Result<YBegin, String> {
    let rest = line
        .strip_prefix(YBEGIN)
        .ok_or_else(|| format!("not a =ybegin line: {}", line))?;

    let (head, name) = split_name(rest);
    let name = name.ok_or_else(|| "missing 'name' parameter".to_string())?;
    if name.is_empty() {
        return Err("empty 'name' parameter".to_string());
    }

    let params = parse_params(head);
    let size = required(&params, "size")?;
    let line_len = optional(&params, "line")?;
    let part = optional(&params, "part")?;
    let total = optional(&params, "total")?;

    if part == Some(0) {
        return Err("part index must be at least 1".to_string());
    }

    Ok(YBegin {
        line: line_len,
        size,
        name: name.to_string(),
        part,
        total,
    })
}

/// Parse `=ypart begin=1 end=123456`
pub(crate) fn parse_ypart(line: &str) -> Result<YPart, String> {
    let rest = line
        .strip_prefix(YPART)
        .ok_or_else(|| format!("not a =ypart line: {}", line))?;

    let params = parse_params(rest);
    let begin: u64 = required(&params, "begin")?;
    let end: u64 = required(&params, "end")?;

    if begin == 0 || begin > end {
        return Err(format!("impossible range begin={} end={}", begin, end));
    }

    Ok(YPart { begin, end })
}

/// Parse `=yend size=123456 [part=1] [pcrc32=0a1b2c3d] [crc32=0a1b2c3d]`
pub(crate) fn parse_yend(line: &str) -> Result<YEnd, String> {
    let rest = line
        .strip_prefix(YEND)
        .ok_or_else(|| format!("not a =yend line: {}", line))?;

    let params = parse_params(rest);

    Ok(YEnd {
        size: required(&params, "size")?,
        part: optional(&params, "part")?,
        pcrc32: hex(&params, "pcrc32")?,
        crc32: hex(&params, "crc32")?,
    })
}

/// Split off a trailing `name=...` (which must start at a keyword boundary)
fn split_name(params: &str) -> (&str, Option<&str>) {
    if let Some(value) = params.strip_prefix("name=") {
        return ("", Some(value.trim_end()));
    }
    match params.find(" name=") {
        Some(idx) => (&params[..idx], Some(params[idx + 6..].trim_end())),
        None => (params, None),
    }
}

/// Whitespace separated `key=value` pairs; tokens without `=` are ignored
fn parse_params(params: &str) -> HashMap<&str, &str> {
    params
        .split_ascii_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect()
}

fn required<T: std::str::FromStr>(params: &HashMap<&str, &str>, key: &str) -> Result<T, String> {
    optional(params, key)?.ok_or_else(|| format!("missing '{}' parameter", key))
}

fn optional<T: std::str::FromStr>(
    params: &HashMap<&str, &str>,
    key: &str,
) -> Result<Option<T>, String> {
    params
        .get(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| format!("invalid '{}' value: {}", key, value))
        })
        .transpose()
}

fn hex(params: &HashMap<&str, &str>, key: &str) -> Result<Option<u32>, String> {
    params
        .get(key)
        .map(|value| {
            u32::from_str_radix(value, 16)
                .map_err(|_| format!("invalid '{}' value: {}", key, value))
        })
        .transpose()
}
