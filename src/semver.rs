//! A deliberately non-standard semantic version parser and comparator.
//!
//! This does not implement SemVer 2.0 precedence: prerelease identifiers are
//! compared lexicographically as whole strings rather than per-dot-segment,
//! and there is no special numeric-vs-alphanumeric identifier rule. This
//! matches what the control plane's reference evaluator does, and targeting
//! conditions must agree with it bit for bit.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// A parsed semantic version: `major.minor.patch[-prerelease]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:-([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*))?$").unwrap()
    })
}

impl SemVer {
    /// Parse a version string. Returns `None` if it doesn't match the
    /// accepted grammar.
    pub fn parse(s: &str) -> Option<SemVer> {
        let caps = pattern().captures(s.trim())?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps
            .get(3)
            .map(|m| m.as_str().parse().ok())
            .unwrap_or(Some(0))?;
        let prerelease = caps.get(4).map(|m| m.as_str().to_owned());
        Some(SemVer {
            major,
            minor,
            patch,
            prerelease,
        })
    }

    /// Total order matching the control plane's comparator: numeric triple
    /// first, then "no prerelease" beats "has prerelease", then lexical
    /// comparison of the prerelease string.
    pub fn compare_to(&self, other: &SemVer) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare_to(other))
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_triple() {
        let v = SemVer::parse("1.2.3-beta.1").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert_eq!(v.prerelease.as_deref(), Some("beta.1"));
    }

    #[test]
    fn missing_patch_defaults_to_zero() {
        let v = SemVer::parse("1.2").unwrap();
        assert_eq!(v.patch, 0);
    }

    #[test]
    fn leading_zeros_are_discarded() {
        let v = SemVer::parse("01.02.03").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
    }

    #[test]
    fn rejects_malformed() {
        assert!(SemVer::parse("not-a-version").is_none());
        assert!(SemVer::parse("1").is_none());
        assert!(SemVer::parse("-1.2.3").is_none());
    }

    #[test]
    fn no_prerelease_beats_prerelease() {
        let release = SemVer::parse("1.0.0").unwrap();
        let rc = SemVer::parse("1.0.0-rc.1").unwrap();
        assert!(release > rc);
    }

    #[test]
    fn prerelease_is_lexical_not_numeric() {
        // Under SemVer 2.0, "rc.2" < "rc.10" numerically. Here it is lexical.
        let a = SemVer::parse("1.0.0-rc.2").unwrap();
        let b = SemVer::parse("1.0.0-rc.10").unwrap();
        assert!(a > b, "lexical compare: \"rc.2\" > \"rc.10\"");
    }

    #[test]
    fn numeric_triple_orders_normally() {
        let a = SemVer::parse("1.9.0").unwrap();
        let b = SemVer::parse("1.10.0").unwrap();
        assert!(a < b);
    }
}
