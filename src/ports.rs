use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Leading marker meaning "expect this port closed".
pub const NEGATION: char = '-';

// Leading/trailing delimiters leave empty tokens, which `normalize` rejects.
static SPEC_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("spec delimiter pattern is valid"));

/// Port specification as written in the manifest: one delimited string, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawSpec {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for RawSpec {
    fn from(s: &str) -> Self {
        RawSpec::One(s.to_string())
    }
}

impl From<Vec<&str>> for RawSpec {
    fn from(v: Vec<&str>) -> Self {
        RawSpec::Many(v.into_iter().map(String::from).collect())
    }
}

/// Flatten a raw spec into atomic port tokens, in order.
///
/// Each string is split on any run of commas and/or whitespace. Any empty token
/// (e.g. from a leading comma or an empty string) rejects the whole spec.
pub fn normalize(raw: &RawSpec) -> Result<Vec<String>, SpecError> {
    let tokens: Vec<String> = match raw {
        RawSpec::One(s) => split_spec(s).collect(),
        RawSpec::Many(items) => items.iter().flat_map(|s| split_spec(s)).collect(),
    };

    if tokens.iter().any(String::is_empty) {
        return Err(SpecError::InvalidSpecification { tokens });
    }
    Ok(tokens)
}

fn split_spec(s: &str) -> impl Iterator<Item = String> + '_ {
    SPEC_DELIMITER.split(s).map(String::from)
}

pub fn is_negated(token: &str) -> bool {
    token.starts_with(NEGATION)
}

/// Remove one negation marker anchored at the start; a `-` anywhere else is kept.
pub fn strip_negation(token: &str) -> &str {
    token.strip_prefix(NEGATION).unwrap_or(token)
}

/// Drop the protocol prefix, keeping the negation marker: `-TCP:80` becomes `-80`.
pub fn strip_protocol(token: &str) -> String {
    let negated = is_negated(token);
    let bare = strip_negation(token).rsplit(':').next().unwrap_or_default();
    if negated {
        format!("{NEGATION}{bare}")
    } else {
        bare.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Icmp,
}

impl Protocol {
    /// Protocols that can actually be scanned, in grouping order.
    pub const SCANNABLE: [Protocol; 4] = [Protocol::Tcp, Protocol::Udp, Protocol::Http, Protocol::Https];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Icmp => "icmp",
        }
    }

    /// Upper-cased first letter, used in the scanner's port list.
    pub fn initial(self) -> char {
        self.as_str()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('T')
    }

    pub fn is_http(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "icmp" => Ok(Protocol::Icmp),
            _ => Err(SpecError::UnsupportedProtocol { protocol: s.to_string() }),
        }
    }
}

/// Protocol of a token from its (case-insensitive) prefix; no prefix means TCP.
pub fn classify(token: &str) -> Result<Protocol, SpecError> {
    match strip_negation(token).split_once(':') {
        Some((prefix, _)) => prefix.parse(),
        None => Ok(Protocol::Tcp),
    }
}

/// Split tokens into per-protocol batches, one scan each.
///
/// Batches come out in `Protocol::SCANNABLE` order and keep token order.
/// ICMP tokens are recognised but have no scan path, so they are dropped.
pub fn group_by_protocol(tokens: &[String]) -> Result<Vec<(Protocol, Vec<String>)>, SpecError> {
    let mut groups: Vec<(Protocol, Vec<String>)> =
        Protocol::SCANNABLE.iter().map(|p| (*p, Vec::new())).collect();

    for token in tokens {
        let proto = classify(token)?;
        match groups.iter_mut().find(|(p, _)| *p == proto) {
            Some((_, group)) => group.push(token.clone()),
            None => tracing::warn!(%token, "icmp checks are not implemented, skipping"),
        }
    }

    groups.retain(|(_, group)| !group.is_empty());
    Ok(groups)
}

/// One expected port state, derived from exactly one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub port: u16,
    pub protocol: Protocol,
    pub negated: bool,
}

impl Expectation {
    /// Parse one token (`80`, `-80`, `UDP:53`, `-TCP:22`) for a scan of `protocol`.
    ///
    /// `TCP:-80` is rejected on purpose: the negation marker only counts at
    /// position 0, so a `-` after the protocol prefix is a malformed port.
    pub fn parse(token: &str, protocol: Protocol) -> Result<Self, SpecError> {
        let bare = strip_protocol(strip_negation(token));
        let port = parse_port_str(&bare).ok_or_else(|| SpecError::InvalidPort {
            token: token.to_string(),
        })?;
        Ok(Self {
            port,
            protocol,
            negated: is_negated(token),
        })
    }

    pub fn expected_state(&self) -> &'static str {
        if self.negated {
            "closed"
        } else {
            "open"
        }
    }

    /// Whether the discovered open ports satisfy this expectation.
    pub fn is_satisfied_by(&self, open_ports: &[u16]) -> bool {
        open_ports.contains(&self.port) != self.negated
    }
}

fn parse_port_str(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u32>() {
        Ok(val) if (1..=65535).contains(&val) => Some(val as u16),
        _ => None,
    }
}
