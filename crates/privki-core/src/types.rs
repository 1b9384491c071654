//! Domain types shared by the engine and the CLI.

use chrono::{DateTime, Duration, Months, Utc};
use std::fmt;

use crate::error::{PkiError, Result};

/// Default certificate policy OID for class definitions.
pub const DEFAULT_OID: &str = "1.3.6.1.5.5.7.8.5";

/// Sentinel the original command surface used for "flag not given".
pub const UNSET_SENTINEL: &str = "NA";

/// Minimum accepted passphrase length.
pub const MIN_PASSPHRASE_LEN: usize = 6;

/// Root validity in years.
pub const ROOT_VALIDITY_YEARS: u32 = 30;

/// Intermediate validity in years.
pub const INTERMEDIATE_VALIDITY_YEARS: u32 = 18;

/// Timestamp layout used for validity windows and intermediate directory names.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// Role of a CA inside the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaRole {
    /// Self-signed root (A0)
    Root,
    /// Disaster-recovery root (A0-DR), cross-signs intermediates
    DrRoot,
    /// Intermediate (A1) being built
    Intermediate,
}

impl CaRole {
    /// Directory suffix after `<uid>-`.
    #[must_use]
    pub const fn dir_suffix(self) -> &'static str {
        match self {
            Self::Root => "root-ca",
            Self::DrRoot => "dr-root-ca",
            Self::Intermediate => "intermed-ca",
        }
    }

    /// File stem used for the `.cnf`, `.index`, `.serial`, key and cert files.
    ///
    /// The DR root reuses the root's stem so both root directories share a layout.
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Root | Self::DrRoot => "root-ca",
            Self::Intermediate => "intermed-ca",
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Root => "A0",
            Self::DrRoot => "A0-DR",
            Self::Intermediate => "A1",
        }
    }

    /// Tag embedded in the human-readable certificate file name.
    #[must_use]
    pub const fn readable_tag(self) -> &'static str {
        match self {
            Self::Root => "RA0",
            Self::DrRoot => "RA0_D",
            Self::Intermediate => "IA1",
        }
    }
}

impl fmt::Display for CaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Known files under `<home>/.privki/config/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Unique identifier of this PKI generation
    RootCertUid,
    /// Absolute path of the active PKI materials directory
    PkiPath,
    /// Custom policy OID
    Oid,
    /// Organization legal name
    Org,
    /// Organization common name
    Common,
    /// `true` once a DR root exists
    DrStatus,
    /// Reserved empty marker
    PrimaryRoot,
}

impl StateKey {
    /// File name inside the config directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::RootCertUid => "root_cert_uid",
            Self::PkiPath => "pki_path",
            Self::Oid => "oid",
            Self::Org => "org",
            Self::Common => "common",
            Self::DrStatus => "drstatus",
            Self::PrimaryRoot => "primary_root",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Identifier seeding one PKI generation, used as a directory prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootUid(String);

impl RootUid {
    /// Generate a fresh, globally unique 20-character token.
    #[must_use]
    pub fn generate() -> Self {
        Self(xid::new().to_string())
    }

    /// Wrap a stored identifier, rejecting empty or path-like values.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value.contains(['/', '\\']) || value.contains(char::is_whitespace)
        {
            return Err(PkiError::Environment(format!(
                "stored root uid {value:?} is not a valid identifier"
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// The identifier as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A CA key passphrase.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Validate a passphrase supplied for `flag`.
    pub fn new(flag: &str, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.chars().count() < MIN_PASSPHRASE_LEN {
            return Err(PkiError::invalid_argument(
                flag,
                format!("passphrase must be at least {MIN_PASSPHRASE_LEN} characters"),
            ));
        }
        Ok(Self(value))
    }

    /// The secret bytes, for handing to the crypto backend.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(****)")
    }
}

/// Validity window of an issued certificate, in UTC.
///
/// The start is always one day before "now" to tolerate clock skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
}

impl ValidityWindow {
    /// Window for a self-signed root: `[now-1d, now+30y]`.
    #[must_use]
    pub fn root(now: DateTime<Utc>) -> Self {
        Self::years_from(now, ROOT_VALIDITY_YEARS)
    }

    /// Window for an intermediate: `[now-1d, now+18y]`.
    #[must_use]
    pub fn intermediate(now: DateTime<Utc>) -> Self {
        Self::years_from(now, INTERMEDIATE_VALIDITY_YEARS)
    }

    fn years_from(now: DateTime<Utc>, years: u32) -> Self {
        let not_after = now
            .checked_add_months(Months::new(years * 12))
            .unwrap_or_else(|| now + Duration::days(365 * i64::from(years)));
        Self {
            not_before: now - Duration::days(1),
            not_after,
        }
    }

    /// Start date as `YYYYMMDDhhmmssZ`.
    #[must_use]
    pub fn start_stamp(&self) -> String {
        self.not_before.format(STAMP_FORMAT).to_string()
    }

    /// End date as `YYYYMMDDhhmmssZ`.
    #[must_use]
    pub fn end_stamp(&self) -> String {
        self.not_after.format(STAMP_FORMAT).to_string()
    }
}

/// Human-readable certificate file name: `<org>_<common>_<tag>_<uid>.pem`.
///
/// Every space becomes a single `-`.
#[must_use]
pub fn readable_cert_name(org: &str, common: &str, tag: &str, uid: &RootUid) -> String {
    format!("{org}_{common}_{tag}_{uid}.pem").replace(' ', "-")
}

/// Human-readable chain bundle name: `<org>_<common>_<tag>_<uid>chain-bundle.pem`.
#[must_use]
pub fn readable_bundle_name(org: &str, common: &str, tag: &str, uid: &RootUid) -> String {
    format!("{org}_{common}_{tag}_{uid}chain-bundle.pem").replace(' ', "-")
}

/// Returns the trimmed value if a flag was really supplied.
///
/// Absent, empty, whitespace-only and the `NA` sentinel all count as unset.
#[must_use]
pub fn supplied(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != UNSET_SENTINEL)
}

/// Like [`supplied`] but fails with `MissingArgument` naming `flag`.
pub fn require<'a>(flag: &str, value: Option<&'a str>) -> Result<&'a str> {
    supplied(value).ok_or_else(|| PkiError::missing_argument(flag))
}

/// Check that `value` is one DNS name usable as a single permitted subtree.
///
/// Labels are non-empty runs of ASCII letters, digits, `-` or `*`, so
/// separators that would add subtrees or config lines are rejected.
pub fn dns_name<'a>(flag: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.len() > 253 {
        return Err(PkiError::invalid_argument(
            flag,
            "must be a DNS name of 1 to 253 characters",
        ));
    }
    for label in value.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(PkiError::invalid_argument(
                flag,
                format!("{value:?} has an empty or oversized label"),
            ));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '*'))
        {
            return Err(PkiError::invalid_argument(
                flag,
                format!("{value:?} contains {c:?}, expected a single DNS name"),
            ));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_role_layout_names() {
        assert_eq!(CaRole::Root.dir_suffix(), "root-ca");
        assert_eq!(CaRole::DrRoot.dir_suffix(), "dr-root-ca");
        assert_eq!(CaRole::DrRoot.file_stem(), "root-ca");
        assert_eq!(CaRole::Intermediate.file_stem(), "intermed-ca");
        assert_eq!(CaRole::DrRoot.readable_tag(), "RA0_D");
    }

    #[test]
    fn test_generated_uid_shape() {
        let uid = RootUid::generate();
        assert_eq!(uid.as_str().len(), 20);
        assert!(uid
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(uid, RootUid::generate());
    }

    #[test]
    fn test_uid_parse_rejects_paths() {
        assert!(RootUid::parse("abc/def").is_err());
        assert!(RootUid::parse("  ").is_err());
        assert_eq!(RootUid::parse("c0ffee\n").unwrap().as_str(), "c0ffee");
    }

    #[test]
    fn test_passphrase_minimum() {
        assert!(Passphrase::new("--passphrase", "five5").is_err());
        assert!(Passphrase::new("--passphrase", "sixchr").is_ok());
        let err = Passphrase::new("--root-passphrase", "x").unwrap_err();
        assert!(err.to_string().contains("--root-passphrase"));
    }

    #[test]
    fn test_passphrase_debug_is_redacted() {
        let p = Passphrase::new("--passphrase", "sixchars").unwrap();
        assert!(!format!("{p:?}").contains("sixchars"));
    }

    #[test]
    fn test_validity_windows() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 30, 45).unwrap();
        let root = ValidityWindow::root(now);
        assert_eq!(root.start_stamp(), "20261016123045Z");
        assert_eq!(root.end_stamp(), "20561017123045Z");

        let a1 = ValidityWindow::intermediate(now);
        assert_eq!(a1.start_stamp(), "20261016123045Z");
        assert_eq!(a1.end_stamp(), "20441017123045Z");
    }

    #[test]
    fn test_readable_names() {
        let uid = RootUid::parse("cs0abc").unwrap();
        assert_eq!(
            readable_cert_name("Alpha Beta", "Alpha Beta CA", "RA0", &uid),
            "Alpha-Beta_Alpha-Beta-CA_RA0_cs0abc.pem"
        );
        assert_eq!(
            readable_bundle_name("Alpha Beta", "Alpha Beta CA", "IA1_C", &uid),
            "Alpha-Beta_Alpha-Beta-CA_IA1_C_cs0abcchain-bundle.pem"
        );
    }

    #[test]
    fn test_supplied_sentinels() {
        assert_eq!(supplied(None), None);
        assert_eq!(supplied(Some("NA")), None);
        assert_eq!(supplied(Some("   ")), None);
        assert_eq!(supplied(Some(" Alpha ")), Some("Alpha"));
        assert!(require("--org", Some("")).is_err());
    }

    #[test]
    fn test_dns_name_accepts_single_names() {
        assert_eq!(dns_name("--name-restrict", "chat.alpha.com").unwrap(), "chat.alpha.com");
        assert!(dns_name("--name-restrict", "*.alpha-beta.com").is_ok());
        assert!(dns_name("--name-restrict", "localhost").is_ok());
    }

    #[test]
    fn test_dns_name_rejects_extra_subtrees() {
        for bad in [
            "chat.alpha.com,permitted;DNS:evil.com",
            "chat.alpha.com\npermitted.DNS.2 = evil.com",
            "chat alpha.com",
            "chat..alpha.com",
            ".alpha.com",
            "",
        ] {
            let err = dns_name("--name-restrict", bad).unwrap_err();
            assert!(
                matches!(err, PkiError::InvalidArgument { ref flag, .. } if flag == "--name-restrict"),
                "{bad:?} accepted"
            );
        }
    }

    proptest! {
        #[test]
        fn dns_name_never_accepts_separators(
            head in "[a-z]{1,8}",
            sep in "[,;: \n\t]",
            tail in "[a-z]{1,8}",
        ) {
            let value = format!("{head}{sep}{tail}");
            prop_assert!(dns_name("--name-restrict", &value).is_err());
        }

        #[test]
        fn readable_names_never_contain_spaces(
            org in "[A-Za-z ]{1,24}",
            common in "[A-Za-z ]{1,24}",
        ) {
            let uid = RootUid::generate();
            let name = readable_cert_name(&org, &common, "IA1", &uid);
            prop_assert!(!name.contains(' '));
            prop_assert!(name.ends_with(".pem"));
            prop_assert_eq!(name.matches('-').count(), org.matches(' ').count() + common.matches(' ').count());
        }
    }
}
