//! HMC inventory file (YAML).
//!
//! An inventory file describes the HMCs a test environment can reach, as
//! hierarchical groups of hosts. Each host carries at minimum a DNS name
//! or IP address; a host that references a mock-definition file declares
//! a mocked environment instead of a real HMC.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use zhmc_core::{Error, Result};

/// Root of an inventory file: named top-level groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmcInventory {
    /// Top-level host groups.
    #[serde(default)]
    pub groups: BTreeMap<String, HostGroup>,
}

/// A group of hosts, possibly with nested subgroups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostGroup {
    /// Hosts in this group, keyed by their inventory name.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,
    /// Nested subgroups.
    #[serde(default)]
    pub groups: BTreeMap<String, HostGroup>,
}

/// One HMC host entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HostEntry {
    /// DNS name or IP address. When absent, the inventory name of the
    /// entry is the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Path to a mock-definition file; declares a mocked environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_file: Option<PathBuf>,
}

impl HostEntry {
    /// Whether this entry declares a mocked environment.
    pub fn is_mocked(&self) -> bool {
        self.mock_file.is_some()
    }
}

fn yaml_error(err: &serde_yaml::Error) -> Error {
    let (line, column) = err
        .location()
        .map_or((0, 0), |loc| (loc.line(), loc.column()));
    Error::Parse {
        detail: err.to_string(),
        line,
        column,
    }
}

impl HmcInventory {
    /// Parse an inventory from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| yaml_error(&e))
    }

    /// Load an inventory file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Parse {
            detail: format!("cannot read inventory file {}: {e}", path.display()),
            line: 0,
            column: 0,
        })?;
        Self::from_yaml_str(&text)
    }

    /// All host entries, flattened across groups, as (inventory name,
    /// entry) pairs.
    pub fn host_entries(&self) -> Vec<(&str, &HostEntry)> {
        fn walk<'a>(group: &'a HostGroup, out: &mut Vec<(&'a str, &'a HostEntry)>) {
            for (name, entry) in &group.hosts {
                out.push((name.as_str(), entry));
            }
            for nested in group.groups.values() {
                walk(nested, out);
            }
        }
        let mut out = Vec::new();
        for group in self.groups.values() {
            walk(group, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "\
groups:
  default:
    hosts:
      hmc1:
        host: 10.11.12.13
        description: production HMC
    groups:
      dev:
        hosts:
          mocked-z16:
            mock-file: mocked_z16.yaml
";

    #[test]
    fn parses_nested_groups() {
        let inventory = HmcInventory::from_yaml_str(EXAMPLE).unwrap();
        let entries = inventory.host_entries();
        assert_eq!(entries.len(), 2);
        let (_, hmc1) = entries.iter().find(|(name, _)| *name == "hmc1").unwrap();
        assert_eq!(hmc1.host.as_deref(), Some("10.11.12.13"));
        assert!(!hmc1.is_mocked());
        let (_, mocked) = entries
            .iter()
            .find(|(name, _)| *name == "mocked-z16")
            .unwrap();
        assert!(mocked.is_mocked());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let bad = "groups:\n  default:\n    hosts:\n      h1:\n        hostname: x\n";
        assert!(HmcInventory::from_yaml_str(bad).is_err());
    }
}
