//! Exact semantic versions.
//!
//! Rulestack pins dependencies to exact `MAJOR.MINOR.PATCH` triples: no
//! ranges, no pre-release identifiers, no build metadata. This crate wraps
//! [`semver::Version`] with a stricter parser and the two version
//! operations the rest of the workspace needs.

pub use semver::Version;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version `{0}`: expected MAJOR.MINOR.PATCH")]
    Malformed(String),
    #[error("version {new} is not an increase over {old}")]
    NotAnIncrease { old: Version, new: Version },
}

/// Parse an exact `MAJOR.MINOR.PATCH` version.
///
/// Unlike [`semver::Version::parse`], pre-release identifiers and build
/// metadata are rejected: `1.2.3-beta.1` and `1.2.3+42` are not valid
/// rulestack versions.
pub fn parse(s: &str) -> Result<Version, VersionError> {
    let version = Version::parse(s).map_err(|_| VersionError::Malformed(s.to_string()))?;
    if !version.pre.is_empty() || !version.build.is_empty() {
        return Err(VersionError::Malformed(s.to_string()));
    }
    Ok(version)
}

/// The next patch release after `version`.
pub fn increment_patch(version: &Version) -> Version {
    Version::new(version.major, version.minor, version.patch + 1)
}

/// Check that `new` is strictly greater than `old`.
pub fn validate_increase(old: &Version, new: &Version) -> Result<(), VersionError> {
    if new > old {
        Ok(())
    } else {
        Err(VersionError::NotAnIncrease {
            old: old.clone(),
            new: new.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_triples() {
        assert_eq!(parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse("0.0.0").unwrap(), Version::new(0, 0, 0));
        assert_eq!(parse("10.20.30").unwrap(), Version::new(10, 20, 30));
    }

    #[test]
    fn parse_print_round_trips() {
        for s in ["0.1.0", "1.0.0", "2.31.7"] {
            assert_eq!(parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn rejects_partial_versions() {
        assert!(parse("1").is_err());
        assert!(parse("1.2").is_err());
        assert!(parse("1.2.3.4").is_err());
        assert!(parse("").is_err());
        assert!(parse("one.two.three").is_err());
    }

    #[test]
    fn rejects_prerelease_and_build_metadata() {
        assert_eq!(
            parse("1.2.3-beta.1"),
            Err(VersionError::Malformed("1.2.3-beta.1".to_string()))
        );
        assert_eq!(
            parse("1.2.3+build42"),
            Err(VersionError::Malformed("1.2.3+build42".to_string()))
        );
    }

    #[test]
    fn versions_order_componentwise() {
        let v100 = parse("1.0.0").unwrap();
        let v101 = parse("1.0.1").unwrap();
        let v110 = parse("1.1.0").unwrap();
        let v200 = parse("2.0.0").unwrap();
        assert!(v100 < v101);
        assert!(v101 < v110);
        assert!(v110 < v200);
        assert_eq!(v100, parse("1.0.0").unwrap());
    }

    #[test]
    fn increment_patch_bumps_last_component() {
        assert_eq!(
            increment_patch(&Version::new(1, 2, 3)),
            Version::new(1, 2, 4)
        );
    }

    #[test]
    fn validate_increase_requires_strictly_greater() {
        let old = Version::new(1, 2, 0);
        assert!(validate_increase(&old, &Version::new(1, 2, 1)).is_ok());
        assert!(validate_increase(&old, &Version::new(2, 0, 0)).is_ok());
        assert!(validate_increase(&old, &old.clone()).is_err());
        assert!(validate_increase(&old, &Version::new(1, 1, 9)).is_err());
    }
}
