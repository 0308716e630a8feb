//! Certificate verification policy.

use std::path::PathBuf;

/// Environment variable naming an alternate CA bundle (PEM file or
/// directory) used when [`VerifyCert::Default`] is in effect.
pub const CA_BUNDLE_ENV: &str = "ZHMC_CA_BUNDLE";

/// How the HMC's server certificate is verified, for both the Web
/// Services port and the STOMP port.
///
/// The policy is per session / per receiver; it never mutates process-wide
/// transport state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerifyCert {
    /// No verification. Insecure; only for test setups.
    Off,
    /// Verify against the platform trust store, or against the bundle
    /// named by [`CA_BUNDLE_ENV`] when that variable is set.
    #[default]
    Default,
    /// Verify against a caller-supplied PEM file or directory of PEM
    /// files.
    CaPath(PathBuf),
}

impl VerifyCert {
    /// The effective CA path: the explicit path for [`VerifyCert::CaPath`],
    /// the environment override for [`VerifyCert::Default`], `None`
    /// otherwise.
    pub fn ca_path(&self) -> Option<PathBuf> {
        match self {
            VerifyCert::Off => None,
            VerifyCert::Default => std::env::var_os(CA_BUNDLE_ENV).map(PathBuf::from),
            VerifyCert::CaPath(path) => Some(path.clone()),
        }
    }

    /// Whether verification is disabled.
    pub fn is_off(&self) -> bool {
        matches!(self, VerifyCert::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let policy = VerifyCert::CaPath(PathBuf::from("/tmp/ca.pem"));
        assert_eq!(policy.ca_path(), Some(PathBuf::from("/tmp/ca.pem")));
        assert!(!policy.is_off());
    }

    #[test]
    fn off_has_no_path() {
        assert_eq!(VerifyCert::Off.ca_path(), None);
        assert!(VerifyCert::Off.is_off());
    }
}
