//! Config-string parser
//!
//! Configuration strings are `key=value` pairs separated by `;`:
//!
//! ```text
//! engine=memory;admin=root;default=false;auto_create=true
//! ```
//!
//! Whitespace around keys and values is trimmed. A backslash escapes the next
//! character, so `\;` and `\=` can appear inside values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BucketError, Result};

/// Key under which a nested config file may be referenced
pub const CONFIG_FILE_KEY: &str = "config_file";

/// How many `config_file` levels may be nested
pub const MAX_CONFIG_FILE_DEPTH: usize = 4;

/// Parsed `key=value` configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Parse a config string
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for pair in split_unescaped(text, ';') {
            if pair.trim().is_empty() {
                continue;
            }

            let mut parts = split_unescaped(&pair, '=').into_iter();
            let key = parts.next().map(|k| unescape(k.trim())).unwrap_or_default();
            let value = match parts.next() {
                Some(v) => unescape(v.trim()),
                None => {
                    return Err(BucketError::Config(format!(
                        "missing '=' in config pair {:?}",
                        pair.trim()
                    )))
                }
            };
            if parts.next().is_some() {
                return Err(BucketError::Config(format!(
                    "unescaped '=' in value of {:?}",
                    key
                )));
            }
            if key.is_empty() {
                return Err(BucketError::Config(format!(
                    "empty key in config pair {:?}",
                    pair.trim()
                )));
            }

            entries.insert(key, value);
        }

        Ok(Self { entries })
    }

    /// Parse a config string, then splice in any `config_file` it references
    ///
    /// Keys given inline win over keys from the file.
    pub fn parse_with_files(text: &str) -> Result<Self> {
        Self::parse_nested(text, &mut Vec::new())
    }

    /// Read and parse a config file (newlines act as separators too)
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::read_nested(path, &mut Vec::new())
    }

    /// `includes` is the chain of files currently being read
    fn parse_nested(text: &str, includes: &mut Vec<PathBuf>) -> Result<Self> {
        let mut map = Self::parse(text)?;
        if let Some(path) = map.entries.remove(CONFIG_FILE_KEY) {
            let nested = Self::read_nested(Path::new(&path), includes)?;
            for (key, value) in nested.entries {
                map.entries.entry(key).or_insert(value);
            }
        }
        Ok(map)
    }

    fn read_nested(path: &Path, includes: &mut Vec<PathBuf>) -> Result<Self> {
        let unreadable = |e: std::io::Error| {
            BucketError::Config(format!("cannot read config file {}: {}", path.display(), e))
        };
        let canonical = fs::canonicalize(path).map_err(unreadable)?;
        if includes.contains(&canonical) {
            return Err(BucketError::Config(format!(
                "config file {} includes itself",
                path.display()
            )));
        }
        if includes.len() >= MAX_CONFIG_FILE_DEPTH {
            return Err(BucketError::Config(format!(
                "config files nested deeper than {} at {}",
                MAX_CONFIG_FILE_DEPTH,
                path.display()
            )));
        }

        let content = fs::read_to_string(&canonical).map_err(unreadable)?;
        let joined = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect::<Vec<_>>()
            .join(";");

        includes.push(canonical);
        let parsed = Self::parse_nested(&joined, includes);
        includes.pop();
        parsed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Raw string value
    pub fn string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Boolean value (`true/false`, `on/off`, `yes/no`, `1/0`)
    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(Some(true)),
            "false" | "off" | "no" | "0" => Ok(Some(false)),
            _ => Err(BucketError::Config(format!(
                "invalid boolean for {}: {:?}",
                key, raw
            ))),
        }
    }

    /// Size value with optional `k`/`m`/`g` suffix (powers of 1024)
    pub fn size(&self, key: &str) -> Result<Option<u64>> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        let lower = raw.to_ascii_lowercase();
        let (digits, multiplier) = match lower.chars().last() {
            Some('k') => (&lower[..lower.len() - 1], 1024),
            Some('m') => (&lower[..lower.len() - 1], 1024 * 1024),
            Some('g') => (&lower[..lower.len() - 1], 1024 * 1024 * 1024),
            _ => (lower.as_str(), 1),
        };
        let value: u64 = digits.trim().parse().map_err(|_| {
            BucketError::Config(format!("invalid size for {}: {:?}", key, raw))
        })?;
        value
            .checked_mul(multiplier)
            .map(Some)
            .ok_or_else(|| BucketError::Config(format!("size overflow for {}: {:?}", key, raw)))
    }

    /// Floating point value
    pub fn float(&self, key: &str) -> Result<Option<f64>> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|_| {
            BucketError::Config(format!("invalid float for {}: {:?}", key, raw))
        })
    }
}

/// Split on `sep`, ignoring separators preceded by a backslash.
/// Escapes are kept so the pieces can be split again.
fn split_unescaped(text: &str, sep: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);
    pieces
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
