use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::error::{ManifestError, SpecError};
use crate::ports::{group_by_protocol, normalize, RawSpec};
use crate::types::HostCheck;

/// Parsed manifest document, keys in document order.
pub type Manifest = Map<String, Value>;

/// Parse manifest JSON text.
pub fn parse_manifest_str(s: &str) -> Result<Manifest> {
    serde_json::from_str(s).context("manifest must be a JSON object")
}

/// Parse manifest YAML text into the same document model as JSON.
pub fn parse_manifest_yaml_str(s: &str) -> Result<Manifest> {
    serde_yaml::from_str(s).context("manifest must be a YAML mapping")
}

/// Load a manifest from a file path.
///
/// `.yaml` / `.yml` files (any case) are read as YAML, everything else as JSON.
pub fn load_manifest_from_path(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest: {}", path.display()))?;
    let parsed = if is_yaml_path(path) {
        parse_manifest_yaml_str(&content)
    } else {
        parse_manifest_str(&content)
    };
    parsed.with_context(|| format!("failed to parse manifest: {}", path.display()))
}

fn is_yaml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Turn a manifest into scans, one per (host, protocol), in document order.
///
/// Layout: `{ "host" | "instance": { "localhost" | "_<anything>": { <host>: <ports> } } }`.
/// `k8s` / `kubernetes` groups are accepted but produce no checks.
pub fn plan(manifest: &Manifest) -> Result<Vec<HostCheck>, ManifestError> {
    let mut checks = Vec::new();
    for (kind, section) in manifest {
        match kind.as_str() {
            "host" | "instance" => plan_host_groups(kind, section, &mut checks)?,
            "k8s" | "kubernetes" => {
                tracing::warn!(kind = %kind, "cluster tests are not implemented, skipping");
            }
            _ => return Err(ManifestError::UnknownTestGroupKind(kind.clone())),
        }
    }
    Ok(checks)
}

fn plan_host_groups(
    kind: &str,
    section: &Value,
    checks: &mut Vec<HostCheck>,
) -> Result<(), ManifestError> {
    let groups = as_mapping(kind, section)?;
    for (sub_kind, hosts) in groups {
        if sub_kind != "localhost" && !sub_kind.starts_with('_') {
            return Err(ManifestError::UnknownHostGroupKind(sub_kind.clone()));
        }
        for (host, spec) in as_mapping(sub_kind, hosts)? {
            let raw: RawSpec =
                serde_json::from_value(spec.clone()).map_err(|source| ManifestError::InvalidHostSpec {
                    host: host.clone(),
                    source,
                })?;
            let spec_err = |source: SpecError| ManifestError::Spec {
                host: host.clone(),
                source,
            };
            let tokens = normalize(&raw).map_err(spec_err)?;
            tracing::debug!(host = %host, ?tokens, "ports to test");

            for (protocol, tokens) in group_by_protocol(&tokens).map_err(spec_err)? {
                checks.push(HostCheck {
                    host: host.clone(),
                    protocol,
                    tokens,
                });
            }
        }
    }
    Ok(())
}

fn as_mapping<'a>(kind: &str, value: &'a Value) -> Result<&'a Map<String, Value>, ManifestError> {
    value.as_object().ok_or_else(|| ManifestError::NotAMapping {
        kind: kind.to_string(),
    })
}
