//! Milestone and version mapping.
//!
//! A milestone is the integer the release source assigns (`114`); its version
//! is the same number divided by ten with one decimal place (`"11.4"`).

use std::fmt;
use std::str::FromStr;

use crate::error::ClogError;

/// Upstream release identifier
pub type Milestone = u32;

/// Display form of a milestone: `114 -> "11.4"`
pub fn to_version(milestone: Milestone) -> String {
    format!("{}.{}", milestone / 10, milestone % 10)
}

/// Milestone of a version string: `"11.4" -> 114`.
///
/// The fractional part must be a single digit.
pub fn to_milestone(version: &str) -> Option<Milestone> {
    let (major, minor) = version.trim().split_once('.')?;
    let major: Milestone = major.parse().ok()?;

    let mut digits = minor.chars();
    let minor = digits.next()?.to_digit(10)?;
    if digits.next().is_some() {
        return None;
    }

    major.checked_mul(10)?.checked_add(minor)
}

/// A release named either by milestone (`"114"`) or by version (`"11.4"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseRef(pub Milestone);

impl ReleaseRef {
    pub fn milestone(self) -> Milestone {
        self.0
    }

    pub fn version(self) -> String {
        to_version(self.0)
    }
}

impl From<Milestone> for ReleaseRef {
    fn from(milestone: Milestone) -> Self {
        ReleaseRef(milestone)
    }
}

impl FromStr for ReleaseRef {
    type Err = ClogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let milestone = if s.contains('.') {
            to_milestone(s)
        } else {
            s.parse().ok()
        };

        milestone
            .map(ReleaseRef)
            .ok_or_else(|| ClogError::InvalidRelease(s.to_string()))
    }
}

impl fmt::Display for ReleaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_version(self.0))
    }
}
