//! Typed CA configurations rendered from the embedded OpenSSL-style templates.
//!
//! The crypto backend reads the typed fields ([`RootCaConfig::subject`],
//! [`RootCaConfig::permitted_dns`], ...). The rendered `.cnf` text is written
//! next to each CA so the directory stays usable with the `openssl` tools.

const ROOT_TEMPLATE: &str = include_str!("../resources/root_ca.cnf");
const INTERMEDIATE_TEMPLATE: &str = include_str!("../resources/intermed_ca.cnf");

const OID_TOKEN: &str = "#customOID";
const ROOT_ORG_TOKEN: &str = "sample_org Cloud Corporation";
const ROOT_COMMON_TOKEN: &str = "sample_org Root Certification Authority";
const DOMAIN_TOKEN: &str = "sfcc.tech";
const INTERMEDIATE_ORG_TOKEN: &str = "sampledom";
const INTERMEDIATE_DOMAIN: &str = "cluster.internal";
const PERMITTED_DNS_TOKEN: &str = "#permitted.DNS.1";
const NAME_CONSTRAINTS_DIRECTIVE: &str = "nameConstraints";
const SUBJECT_ALT_NAME: &str = "subjectAltName";
const DN_SECTION: &str = "ca_dn";

/// Root directives that point at infrastructure a private PKI does not publish.
const ROOT_DISABLED_DIRECTIVES: [&str; 5] = [
    SUBJECT_ALT_NAME,
    "crl_extensions",
    "issuerAltName",
    "crlDistributionPoints",
    "authorityInfoAccess",
];

/// Country used in every CA subject.
pub const COUNTRY: &str = "US";

/// Common name given to every intermediate.
pub const INTERMEDIATE_COMMON_NAME: &str = "A1";

/// Extension profile applied when signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionProfile {
    /// Self-signed root CA
    RootCa,
    /// Intermediate CA, `pathlen:0`
    IntermediateCa,
}

impl ExtensionProfile {
    /// Section name in the root configuration.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::RootCa => "root-ca_ext",
            Self::IntermediateCa => "intermed-ca_ext",
        }
    }
}

/// Subject distinguished name of a CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    pub country: String,
    pub organization: String,
    pub common_name: String,
}

/// Configuration of a root (or DR root) CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCaConfig {
    pub oid: String,
    pub organization: String,
    pub common_name: String,
    /// Single permitted DNS subtree applied to intermediates signed with this config
    pub name_constraint: Option<String>,
}

impl RootCaConfig {
    /// Stock configuration, no name constraint.
    pub fn new(
        oid: impl Into<String>,
        organization: impl Into<String>,
        common_name: impl Into<String>,
    ) -> Self {
        Self {
            oid: oid.into(),
            organization: organization.into(),
            common_name: common_name.into(),
            name_constraint: None,
        }
    }

    /// Same configuration with the given DNS constraint applied (or removed).
    #[must_use]
    pub fn with_name_constraint(mut self, constraint: Option<&str>) -> Self {
        self.name_constraint = constraint.map(str::to_string);
        self
    }

    /// First word of the organization, used as the `<slug>.tech` domain.
    pub fn domain_slug(&self) -> &str {
        self.organization
            .split_whitespace()
            .next()
            .unwrap_or(&self.organization)
    }

    /// Subject of the self-signed root.
    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName {
            country: COUNTRY.to_string(),
            organization: self.organization.clone(),
            common_name: self.common_name.clone(),
        }
    }

    /// Permitted DNS subtree, if any.
    pub fn permitted_dns(&self) -> Option<&str> {
        self.name_constraint.as_deref()
    }

    /// Render the `.cnf` text.
    pub fn render(&self) -> String {
        let mut text = ROOT_TEMPLATE
            .replace(OID_TOKEN, &self.oid)
            .replace(ROOT_ORG_TOKEN, &self.organization)
            .replace(ROOT_COMMON_TOKEN, &self.common_name)
            .replace(DOMAIN_TOKEN, &format!("{}.tech", self.domain_slug()));
        for directive in ROOT_DISABLED_DIRECTIVES {
            text = comment_out(&text, directive);
        }
        match &self.name_constraint {
            Some(dns) => text.replace(PERMITTED_DNS_TOKEN, &format!("permitted.DNS.1 = {dns}")),
            None => comment_out(&text, NAME_CONSTRAINTS_DIRECTIVE),
        }
    }
}

/// Configuration of an intermediate CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateCaConfig {
    pub oid: String,
    pub organization: String,
}

impl IntermediateCaConfig {
    pub fn new(oid: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            organization: organization.into(),
        }
    }

    /// Subject requested in the intermediate CSR.
    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName {
            country: COUNTRY.to_string(),
            organization: self.organization.clone(),
            common_name: INTERMEDIATE_COMMON_NAME.to_string(),
        }
    }

    /// Render the `.cnf` text.
    pub fn render(&self) -> String {
        let text = set_dn_value(INTERMEDIATE_TEMPLATE, "organizationName", &self.organization);
        let text = set_dn_value(&text, "commonName", INTERMEDIATE_COMMON_NAME);
        let text = text
            .replace(INTERMEDIATE_ORG_TOKEN, &self.organization)
            .replace(DOMAIN_TOKEN, INTERMEDIATE_DOMAIN);
        comment_out(&text, SUBJECT_ALT_NAME).replace(OID_TOKEN, &self.oid)
    }
}

fn comment_out(text: &str, token: &str) -> String {
    text.replace(token, &format!("#{token}"))
}

/// Replace the value of `key` inside the `[ ca_dn ]` section, keeping its alignment.
fn set_dn_value(text: &str, key: &str, value: &str) -> String {
    let mut in_dn = false;
    let mut out = String::with_capacity(text.len() + value.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_dn = trimmed.trim_matches(['[', ']', ' ']) == DN_SECTION;
        }
        match line.split_once('=') {
            Some((lhs, _)) if in_dn && lhs.trim() == key => {
                out.push_str(lhs);
                out.push_str("= ");
                out.push_str(value);
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}
