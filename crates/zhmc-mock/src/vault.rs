//! HMC vault file (YAML): credentials keyed by inventory host name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use zhmc_core::{Error, Result, Secret};

/// Root of a vault file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmcVault {
    /// Credentials keyed by the host's inventory name.
    #[serde(default)]
    pub hmc_auth: BTreeMap<String, HmcCredentials>,
}

/// Credentials of one HMC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmcCredentials {
    /// Userid for logon.
    pub userid: String,
    /// Password for logon. Redacted in any `Debug`/`Display` rendering.
    pub password: Secret,
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

impl HmcVault {
    /// Parse a vault from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| yaml_error(&e))
    }

    /// Load a vault file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Parse {
            detail: format!("cannot read vault file {}: {e}", path.display()),
            line: 0,
            column: 0,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Credentials for an inventory host name.
    pub fn lookup(&self, host_name: &str) -> Option<&HmcCredentials> {
        self.hmc_auth.get(host_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "\
hmc_auth:
  hmc1:
    userid: apiuser
    password: very-secret
";

    #[test]
    fn lookup_and_redaction() {
        let vault = HmcVault::from_yaml_str(EXAMPLE).unwrap();
        let creds = vault.lookup("hmc1").unwrap();
        assert_eq!(creds.userid, "apiuser");
        assert_eq!(creds.password.expose(), "very-secret");
        assert!(!format!("{vault:?}").contains("very-secret"));
        assert_eq!(vault.lookup("missing").map(|c| &c.userid), None);
    }
}
