//! YAML schema of mock-definition files.
//!
//! A mock-definition file describes the complete faked resource tree of a
//! [`MockHmc`], so end-to-end tests can reconstruct an environment from a
//! checked-in file. [`MockHmcDefinition`] round-trips between YAML and a
//! live [`MockHmc`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use zhmc_core::{Error, PropertyMap, Result};

use crate::hmc::MockHmc;

/// Root of a mock-definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MockHmcDefinition {
    /// Name of the faked HMC.
    pub hmc_name: String,
    /// HMC version, e.g. `"2.16.0"`.
    pub hmc_version: String,
    /// Web Services API major version.
    pub api_major_version: u64,
    /// Web Services API minor version.
    pub api_minor_version: u64,
    /// The console singleton, if defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleDefinition>,
    /// The CPCs managed by this HMC.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpcs: Vec<CpcDefinition>,
    /// Root-level storage groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_groups: Vec<ResourceDefinition>,
}

/// The console and its users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConsoleDefinition {
    /// Console name.
    pub name: String,
    /// Additional properties.
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
    /// Users defined on the console.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<ResourceDefinition>,
}

/// One CPC and its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CpcDefinition {
    /// CPC name.
    pub name: String,
    /// Additional properties (`dpm-enabled`, `status`, ...).
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
    /// Partitions (DPM mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<ResourceDefinition>,
    /// LPARs (classic mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lpars: Vec<ResourceDefinition>,
    /// Adapters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adapters: Vec<ResourceDefinition>,
}

/// A generic leaf resource: name plus properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResourceDefinition {
    /// Resource name.
    pub name: String,
    /// Additional properties.
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
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

impl MockHmcDefinition {
    /// Parse a mock-definition from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| yaml_error(&e))
    }

    /// Serialize to YAML text.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| yaml_error(&e))
    }

    /// Build a live faked HMC from this definition.
    pub fn build(&self) -> MockHmc {
        let hmc = MockHmc::new(
            &self.hmc_name,
            &self.hmc_version,
            (self.api_major_version, self.api_minor_version),
        );
        if let Some(console) = &self.console {
            hmc.add_console(&console.name, console.properties.clone());
            for user in &console.users {
                hmc.add_user(&user.name, user.properties.clone());
            }
        }
        for cpc in &self.cpcs {
            let cpc_uri = hmc.add_cpc(&cpc.name, cpc.properties.clone());
            for partition in &cpc.partitions {
                hmc.add_partition(&cpc_uri, &partition.name, partition.properties.clone());
            }
            for lpar in &cpc.lpars {
                hmc.add_lpar(&cpc_uri, &lpar.name, lpar.properties.clone());
            }
            for adapter in &cpc.adapters {
                hmc.add_adapter(&cpc_uri, &adapter.name, adapter.properties.clone());
            }
        }
        for storage_group in &self.storage_groups {
            hmc.add_storage_group(&storage_group.name, storage_group.properties.clone());
        }
        hmc
    }
}

impl MockHmc {
    /// Dump the current faked resource tree as a definition.
    pub fn dump(&self) -> MockHmcDefinition {
        let state = self.inner.state.lock();
        let strip = |props: &PropertyMap| -> PropertyMap {
            let mut props = props.clone();
            props.remove("object-uri");
            props.remove("class");
            props.remove("name");
            props
        };
        let name_of = |props: &PropertyMap| -> String {
            props
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let console = state
            .resources
            .iter()
            .find(|r| r.class == "console")
            .map(|console| ConsoleDefinition {
                name: name_of(&console.properties),
                properties: strip(&console.properties),
                users: state
                    .resources
                    .iter()
                    .filter(|r| r.class == "user")
                    .map(|user| ResourceDefinition {
                        name: name_of(&user.properties),
                        properties: strip(&user.properties),
                    })
                    .collect(),
            });

        let leaf_children = |cpc_uri: &str, class: &str| -> Vec<ResourceDefinition> {
            state
                .resources
                .iter()
                .filter(|r| r.class == class && r.parent.as_deref() == Some(cpc_uri))
                .map(|child| ResourceDefinition {
                    name: name_of(&child.properties),
                    properties: strip(&child.properties),
                })
                .collect()
        };

        MockHmcDefinition {
            hmc_name: self.inner.name.clone(),
            hmc_version: self.inner.hmc_version.clone(),
            api_major_version: self.inner.api_version.0,
            api_minor_version: self.inner.api_version.1,
            console,
            cpcs: state
                .resources
                .iter()
                .filter(|r| r.class == "cpc")
                .map(|cpc| CpcDefinition {
                    name: name_of(&cpc.properties),
                    properties: strip(&cpc.properties),
                    partitions: leaf_children(&cpc.uri, "partition"),
                    lpars: leaf_children(&cpc.uri, "logical-partition"),
                    adapters: leaf_children(&cpc.uri, "adapter"),
                })
                .collect(),
            storage_groups: state
                .resources
                .iter()
                .filter(|r| r.class == "storage-group")
                .map(|storage_group| ResourceDefinition {
                    name: name_of(&storage_group.properties),
                    properties: strip(&storage_group.properties),
                })
                .collect(),
        }
    }
}
