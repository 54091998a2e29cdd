//! OSA version identifiers.
//!
//! A user-facing OSA version looks like `OSA11.2`, `OSA11.2-dev` or
//! `OSA11.2-devsmth-smth-else--fullbkg--jemxnrt`. The part before the first
//! `-` is the base software release, the rest of the first `--`-separated
//! element is the sub-version (a pinned IC tree or development build), and
//! every further `--` element is a behaviour modifier.
//!
//! Modifiers must already be sorted and free of duplicates. We reject rather
//! than normalize, because the raw string ends up in URLs and cache keys and
//! two spellings of the same request must not coexist.

use std::{collections::BTreeMap, fmt};

use tracing::warn;

use crate::{
    error::{OsaError, Result},
    knowledge::VersionRegistry,
};

/// Sub-version used when none is given: the ISDC default IC tree.
pub const DEFAULT_SUBVERSION: &str = "default-isdc";

/// Modifiers understood by the data server modules.
pub const KNOWN_MODIFIERS: &[&str] = &["fullbkg", "jemxnrt", "rmfoffsetv1"];

const MODIFIER_SEPARATOR: &str = "--";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionIdentifier {
    pub base: String,
    pub subversion: String,
    pub modifiers: Vec<String>,
}

impl VersionIdentifier {
    /// Parse a raw version string against the given modifier registry.
    pub fn parse(raw: &str, known_modifiers: &[&str]) -> Result<Self> {
        let mut elements = raw.split(MODIFIER_SEPARATOR);

        // `split` always yields at least one element.
        let head = elements.next().unwrap_or_default();
        let modifiers: Vec<String> = elements.map(str::to_owned).collect();

        let (base, subversion) = match head.split_once('-') {
            Some((base, sub)) => (base, sub),
            None => (head, DEFAULT_SUBVERSION),
        };

        if base.is_empty() {
            return Err(OsaError::malformed(raw, "empty base version"));
        }

        if subversion.is_empty() {
            return Err(OsaError::malformed(raw, "empty sub-version after `-`"));
        }

        let mut expected = modifiers.clone();
        expected.sort();
        expected.dedup();

        if expected != modifiers {
            let corrected = VersionIdentifier {
                base: base.to_owned(),
                subversion: subversion.to_owned(),
                modifiers: expected.clone(),
            };

            return Err(OsaError::malformed(
                raw,
                format!(
                    "modifiers {:?} are not sorted or contain duplicates; expected {:?} (i.e. `{}`)",
                    modifiers, expected, corrected
                ),
            ));
        }

        let unknown: Vec<&String> = modifiers
            .iter()
            .filter(|m| !known_modifiers.contains(&m.as_str()))
            .collect();

        if !unknown.is_empty() {
            return Err(OsaError::malformed(
                raw,
                format!(
                    "unknown modifiers {:?}; known modifiers are {:?}",
                    unknown, known_modifiers
                ),
            ));
        }

        Ok(VersionIdentifier {
            base: base.to_owned(),
            subversion: subversion.to_owned(),
            modifiers,
        })
    }

    /// Parse against [`KNOWN_MODIFIERS`].
    pub fn parse_default(raw: &str) -> Result<Self> {
        Self::parse(raw, KNOWN_MODIFIERS)
    }

    pub fn is_default_subversion(&self) -> bool {
        self.subversion == DEFAULT_SUBVERSION
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }
}

/// Canonical form; re-parsing it yields the same identifier.
impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;

        if !self.is_default_subversion() {
            write!(f, "-{}", self.subversion)?;
        }

        for m in &self.modifiers {
            write!(f, "{}{}", MODIFIER_SEPARATOR, m)?;
        }

        Ok(())
    }
}

/// Which base releases a deployment accepts.
///
/// Obsolete bases map to their replacement. They are only usable together
/// with an explicit sub-version; the plain base yields a deprecation error
/// naming the replacement.
#[derive(Clone, Debug)]
pub struct VersionPolicy {
    pub allowed: Vec<String>,
    pub obsolete: BTreeMap<String, String>,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        VersionPolicy {
            allowed: vec!["OSA10.2".to_owned(), "OSA11.2".to_owned()],
            obsolete: [("OSA11.0", "OSA11.2"), ("OSA11.1", "OSA11.2")]
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }
}

impl VersionPolicy {
    /// Check the base release of `version` against this policy.
    pub fn validate_base(&self, version: &VersionIdentifier) -> Result<()> {
        let base = &version.base;

        if let Some(replacement) = self.obsolete.get(base) {
            if version.is_default_subversion() {
                return Err(OsaError::Deprecated {
                    base: base.clone(),
                    replacement: replacement.clone(),
                });
            }

            return Ok(());
        }

        if !self.allowed.contains(base) {
            return Err(OsaError::InvalidVersion {
                base: base.clone(),
                allowed: self.allowed.clone(),
            });
        }

        Ok(())
    }

    /// Full validation: base release policy, then the development build (if
    /// any) against the registry of known builds.
    pub fn validate(
        &self,
        version: &VersionIdentifier,
        registry: &dyn VersionRegistry,
    ) -> Result<()> {
        self.validate_base(version)?;

        if version.is_default_subversion() {
            return Ok(());
        }

        let known = registry.known_dev_versions()?;

        if !known.iter().any(|k| k == &version.subversion) {
            warn!(
                version = %version,
                "rejecting unknown OSA development version `{}`",
                version.subversion
            );
            return Err(OsaError::UnknownDevVersion {
                subversion: version.subversion.clone(),
                known,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::StaticVersionRegistry;

    #[test]
    fn plain_base() {
        let v = VersionIdentifier::parse_default("OSA10.2").unwrap();
        assert_eq!(v.base, "OSA10.2");
        assert_eq!(v.subversion, DEFAULT_SUBVERSION);
        assert!(v.modifiers.is_empty());
        assert_eq!(v.to_string(), "OSA10.2");
    }

    #[test]
    fn multi_dash_subversion() {
        let v =
            VersionIdentifier::parse_default("OSA11.2-devsmth-smth-else--fullbkg--jemxnrt--rmfoffsetv1")
                .unwrap();
        assert_eq!(v.base, "OSA11.2");
        assert_eq!(v.subversion, "devsmth-smth-else");
        assert_eq!(v.modifiers, ["fullbkg", "jemxnrt", "rmfoffsetv1"]);
        assert!(v.has_modifier("jemxnrt"));
    }

    #[test]
    fn modifiers_without_subversion() {
        let v = VersionIdentifier::parse_default("OSA11.2--fullbkg").unwrap();
        assert_eq!(v.subversion, DEFAULT_SUBVERSION);
        assert_eq!(v.to_string(), "OSA11.2--fullbkg");
    }

    #[test]
    fn unsorted_modifiers() {
        let err = VersionIdentifier::parse_default("OSA11.2-dev--jemxnrt--fullbkg").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(r#"["jemxnrt", "fullbkg"]"#), "{msg}");
        assert!(msg.contains(r#"["fullbkg", "jemxnrt"]"#), "{msg}");
        assert!(msg.contains("OSA11.2-dev--fullbkg--jemxnrt"), "{msg}");
    }

    #[test]
    fn duplicate_modifiers() {
        let err = VersionIdentifier::parse_default("OSA11.2--fullbkg--fullbkg").unwrap_err();
        assert!(matches!(err, OsaError::MalformedVersion { .. }));
    }

    #[test]
    fn unknown_modifier() {
        let err = VersionIdentifier::parse_default("OSA11.2-dev--unknown").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown"), "{msg}");
        for m in KNOWN_MODIFIERS {
            assert!(msg.contains(m), "{msg}");
        }
    }

    #[test]
    fn empty_pieces() {
        assert!(VersionIdentifier::parse_default("").is_err());
        assert!(VersionIdentifier::parse_default("-dev").is_err());
        assert!(VersionIdentifier::parse_default("OSA11.2-").is_err());
        assert!(VersionIdentifier::parse_default("OSA11.2--").is_err());
    }

    #[test]
    fn obsolete_gating() {
        let policy = VersionPolicy::default();
        let registry = StaticVersionRegistry::new(["dev"]);

        let v = VersionIdentifier::parse_default("OSA11.0").unwrap();
        match policy.validate(&v, &registry).unwrap_err() {
            OsaError::Deprecated { base, replacement } => {
                assert_eq!(base, "OSA11.0");
                assert_eq!(replacement, "OSA11.2");
            }
            e => panic!("unexpected error {e}"),
        }

        let v = VersionIdentifier::parse_default("OSA11.0-dev").unwrap();
        policy.validate(&v, &registry).unwrap();
    }

    #[test]
    fn invalid_and_unknown_dev() {
        let policy = VersionPolicy::default();
        let registry = StaticVersionRegistry::new(["dev"]);

        let v = VersionIdentifier::parse_default("OSA9.0").unwrap();
        assert!(matches!(
            policy.validate(&v, &registry),
            Err(OsaError::InvalidVersion { .. })
        ));

        let v = VersionIdentifier::parse_default("OSA11.2-nightly").unwrap();
        assert!(matches!(
            policy.validate(&v, &registry),
            Err(OsaError::UnknownDevVersion { .. })
        ));

        let v = VersionIdentifier::parse_default("OSA11.2--fullbkg").unwrap();
        policy.validate(&v, &registry).unwrap();
    }
}
