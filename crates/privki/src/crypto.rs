//! Cryptographic primitives behind a trait.
//!
//! [`OpensslBackend`] does the work natively through the `openssl` crate and
//! keeps the same on-disk bookkeeping as `openssl ca` (serial file, index
//! ledger, `newcerts/`, CRL counter). CRLs are produced with `rcgen`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Datelike, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::conf::{Conf, ConfMethod};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::{decrypt, encrypt, Cipher};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{
    X509Builder, X509Extension, X509Name, X509NameRef, X509Ref, X509Req, X509ReqBuilder, X509,
};
use privki_core::{Passphrase, PkiError, Result, ValidityWindow};
use rcgen::{CertificateRevocationListParams, Issuer, KeyIdMethod, KeyPair, SerialNumber};
use tracing::debug;
use x509_parser::extensions::{GeneralName, ParsedExtension};

use crate::error::ResultExt;
use crate::fsutil;
use crate::repository::CaDirectory;
use crate::template::{DistinguishedName, ExtensionProfile, RootCaConfig};

/// Default RSA modulus size.
pub const DEFAULT_KEY_BITS: u32 = 4096;

/// Smallest RSA modulus accepted.
pub const MIN_KEY_BITS: u32 = 2048;

/// Days until the next CRL update.
pub const CRL_VALIDITY_DAYS: i64 = 365;

/// Everything a signing operation needs.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// Signing CA
    pub ca: &'a CaDirectory,
    /// Configuration of the signing CA, source of policy and name constraint
    pub config: &'a RootCaConfig,
    pub csr: &'a Path,
    pub cert_out: &'a Path,
    /// Passphrase of the signing CA key
    pub passphrase: &'a Passphrase,
    pub profile: ExtensionProfile,
    pub window: ValidityWindow,
}

/// Cryptographic collaborator used by the issuance engine.
pub trait CryptoBackend {
    /// Confirm the backend works and supports AES-256-CBC. Returns a version string.
    fn availability_check(&self) -> Result<String>;

    /// `n_bytes` of randomness as lowercase hex.
    fn random_hex(&self, n_bytes: usize) -> Result<String>;

    /// New RSA key (encrypted with `passphrase`) and a CSR for `subject`.
    fn generate_csr(
        &self,
        subject: &DistinguishedName,
        key_out: &Path,
        csr_out: &Path,
        passphrase: &Passphrase,
    ) -> Result<()>;

    /// Self-sign `request.csr` with the CA's own key.
    fn self_sign(&self, request: &SigningRequest<'_>) -> Result<()>;

    /// Sign `request.csr` with the CA certificate and key.
    fn sign(&self, request: &SigningRequest<'_>) -> Result<()>;

    /// Write an empty CRL for the CA and advance its CRL counter.
    fn generate_empty_crl(&self, ca: &CaDirectory, passphrase: &Passphrase) -> Result<()>;

    /// Unencrypted PKCS#1 copy of an encrypted key.
    fn rsa_to_pkcs1(&self, key_in: &Path, key_out: &Path, passphrase: &Passphrase) -> Result<()>;
}

/// Native backend on top of the `openssl` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpensslBackend {
    key_bits: u32,
}

impl Default for OpensslBackend {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl OpensslBackend {
    /// Backend generating `key_bits`-bit RSA keys.
    pub fn new(key_bits: u32) -> Result<Self> {
        if key_bits < MIN_KEY_BITS {
            return Err(PkiError::invalid_argument(
                "rsa_key_bits",
                format!("must be at least {MIN_KEY_BITS}"),
            ));
        }
        Ok(Self { key_bits })
    }

    pub const fn key_bits(&self) -> u32 {
        self.key_bits
    }

    fn load_key(path: &Path, passphrase: &Passphrase) -> Result<PKey<Private>> {
        let pem = fsutil::read(path)?;
        PKey::private_key_from_pem_passphrase(&pem, passphrase.expose())
            .crypto_step(format_args!(
                "unlock private key {} (wrong passphrase?)",
                path.display()
            ))
    }

    fn load_csr(path: &Path) -> Result<X509Req> {
        let step = format!("load CSR {}", path.display());
        let csr = X509Req::from_pem(&fsutil::read(path)?).crypto_step(&step)?;
        let public = csr.public_key().crypto_step(&step)?;
        if !csr.verify(&public).crypto_step(&step)? {
            return Err(PkiError::crypto(step, "CSR signature does not verify"));
        }
        Ok(csr)
    }

    fn issue(
        request: &SigningRequest<'_>,
        csr: &X509Req,
        issuer: Option<&X509>,
        signing_key: &PKey<Private>,
    ) -> Result<X509> {
        let step = format!(
            "issue {} with {}",
            request.profile.section(),
            request.ca.path().display()
        );
        let serial = request.ca.read_serial()?;
        let subject_key = csr.public_key().crypto_step(&step)?;
        let subject = csr.subject_name();
        let issuer_ref: Option<&X509Ref> = issuer.map(|c| &**c);
        let issuer_name: &X509NameRef = issuer_ref.map_or(subject, X509Ref::subject_name);

        let mut builder = X509Builder::new().crypto_step(&step)?;
        builder.set_version(2).crypto_step(&step)?;
        let serial = BigNum::from_hex_str(&serial)
            .and_then(|bn| bn.to_asn1_integer())
            .crypto_step(&step)?;
        builder.set_serial_number(&serial).crypto_step(&step)?;
        builder.set_subject_name(subject).crypto_step(&step)?;
        builder.set_issuer_name(issuer_name).crypto_step(&step)?;
        builder.set_pubkey(&subject_key).crypto_step(&step)?;
        let not_before = asn1_time(request.window.not_before)?;
        builder.set_not_before(&not_before).crypto_step(&step)?;
        let not_after = asn1_time(request.window.not_after)?;
        builder.set_not_after(&not_after).crypto_step(&step)?;

        let mut basic = BasicConstraints::new();
        basic.critical().ca();
        if request.profile == ExtensionProfile::IntermediateCa {
            basic.pathlen(0);
        }
        builder
            .append_extension(basic.build().crypto_step(&step)?)
            .crypto_step(&step)?;
        let usage = KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()
            .crypto_step(&step)?;
        builder.append_extension(usage).crypto_step(&step)?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(issuer_ref, None))
            .crypto_step(&step)?;
        builder.append_extension(ski).crypto_step(&step)?;
        let aki = AuthorityKeyIdentifier::new()
            .keyid(true)
            .build(&builder.x509v3_context(issuer_ref, None))
            .crypto_step(&step)?;
        builder.append_extension(aki).crypto_step(&step)?;

        // String-valued extensions resolve through a config database.
        let conf = Conf::new(ConfMethod::default()).crypto_step(&step)?;
        #[allow(deprecated)]
        let policies = X509Extension::new_nid(
            None,
            Some(&builder.x509v3_context(issuer_ref, Some(&conf))),
            Nid::CERTIFICATE_POLICIES,
            &request.config.oid,
        )
        .crypto_step(format_args!("{step}: certificate policy {}", request.config.oid))?;
        builder.append_extension(policies).crypto_step(&step)?;

        if request.profile == ExtensionProfile::IntermediateCa {
            if let Some(dns) = request.config.permitted_dns() {
                #[allow(deprecated)]
                let constraint = X509Extension::new_nid(
                    None,
                    Some(&builder.x509v3_context(issuer_ref, Some(&conf))),
                    Nid::NAME_CONSTRAINTS,
                    &format!("critical,permitted;DNS:{dns}"),
                )
                .crypto_step(format_args!("{step}: name constraint {dns}"))?;
                builder.append_extension(constraint).crypto_step(&step)?;
            }
        }

        builder
            .sign(signing_key, MessageDigest::sha256())
            .crypto_step(&step)?;
        Ok(builder.build())
    }

    /// Write the certificate and record it like `openssl ca` does.
    fn record(request: &SigningRequest<'_>, cert: &X509) -> Result<()> {
        let pem = cert
            .to_pem()
            .crypto_step(format_args!("encode {}", request.cert_out.display()))?;
        fsutil::write(request.cert_out, &pem)?;

        let serial = request.ca.read_serial()?.to_uppercase();
        fsutil::write(&request.ca.newcerts_dir().join(format!("{serial}.pem")), &pem)?;

        let line = format!(
            "V\t{}\t\t{serial}\tunknown\t{}\n",
            ledger_time(request.window.not_after),
            oneline(cert.subject_name())
        );
        let index = request.ca.index();
        let mut ledger = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&index)
            .map_err(|e| PkiError::io(&index, e))?;
        ledger
            .write_all(line.as_bytes())
            .map_err(|e| PkiError::io(&index, e))?;
        debug!(serial = %serial, cert = %request.cert_out.display(), "certificate recorded");
        Ok(())
    }
}

impl CryptoBackend for OpensslBackend {
    fn availability_check(&self) -> Result<String> {
        let cipher = Cipher::aes_256_cbc();
        let key = [0x5a_u8; 32];
        let iv = [0xa5_u8; 16];
        let sample = b"privki availability check";
        let roundtrip = encrypt(cipher, &key, Some(&iv[..]), sample)
            .and_then(|sealed| decrypt(cipher, &key, Some(&iv[..]), &sealed))
            .map_err(|e| PkiError::Environment(format!("AES-256-CBC unavailable: {e}")))?;
        if roundtrip != sample {
            return Err(PkiError::Environment(
                "AES-256-CBC round trip produced different bytes".to_string(),
            ));
        }
        Ok(openssl::version::version().to_string())
    }

    fn random_hex(&self, n_bytes: usize) -> Result<String> {
        let mut buf = vec![0_u8; n_bytes];
        openssl::rand::rand_bytes(&mut buf).crypto_step("generate random bytes")?;
        Ok(hex::encode(buf))
    }

    fn generate_csr(
        &self,
        subject: &DistinguishedName,
        key_out: &Path,
        csr_out: &Path,
        passphrase: &Passphrase,
    ) -> Result<()> {
        let step = format!("generate CSR {}", csr_out.display());
        let rsa = Rsa::generate(self.key_bits).crypto_step(&step)?;
        let key = PKey::from_rsa(rsa).crypto_step(&step)?;

        let mut req = X509ReqBuilder::new().crypto_step(&step)?;
        req.set_version(0).crypto_step(&step)?;
        let name = x509_name(subject)?;
        req.set_subject_name(&name).crypto_step(&step)?;
        req.set_pubkey(&key).crypto_step(&step)?;

        let mut extensions = Stack::new().crypto_step(&step)?;
        extensions
            .push(
                BasicConstraints::new()
                    .critical()
                    .ca()
                    .build()
                    .crypto_step(&step)?,
            )
            .crypto_step(&step)?;
        extensions
            .push(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .crypto_step(&step)?,
            )
            .crypto_step(&step)?;
        req.add_extensions(&extensions).crypto_step(&step)?;
        req.sign(&key, MessageDigest::sha256()).crypto_step(&step)?;

        let key_pem = key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.expose())
            .crypto_step(&step)?;
        fsutil::write_key(key_out, &key_pem)?;
        let csr_pem = req.build().to_pem().crypto_step(&step)?;
        fsutil::write(csr_out, &csr_pem)
    }

    fn self_sign(&self, request: &SigningRequest<'_>) -> Result<()> {
        let key = Self::load_key(&request.ca.key(), request.passphrase)?;
        let csr = Self::load_csr(request.csr)?;
        let csr_key = csr
            .public_key()
            .crypto_step(format_args!("load CSR {}", request.csr.display()))?;
        if !csr_key.public_eq(&key) {
            return Err(PkiError::crypto(
                format!("self-sign {}", request.csr.display()),
                "CSR public key does not match the CA key",
            ));
        }
        let cert = Self::issue(request, &csr, None, &key)?;
        Self::record(request, &cert)
    }

    fn sign(&self, request: &SigningRequest<'_>) -> Result<()> {
        let ca_cert_path = request.ca.cert();
        let ca_cert = X509::from_pem(&fsutil::read(&ca_cert_path)?)
            .crypto_step(format_args!("load CA certificate {}", ca_cert_path.display()))?;
        let key = Self::load_key(&request.ca.key(), request.passphrase)?;
        let csr = Self::load_csr(request.csr)?;
        let cert = Self::issue(request, &csr, Some(&ca_cert), &key)?;
        Self::record(request, &cert)
    }

    fn generate_empty_crl(&self, ca: &CaDirectory, passphrase: &Passphrase) -> Result<()> {
        let crl_path = ca.crl();
        let step = format!("generate CRL {}", crl_path.display());

        let cert_pem = fsutil::read_to_string(&ca.cert())?;
        let ca_cert = X509::from_pem(cert_pem.as_bytes()).crypto_step(&step)?;
        let key = Self::load_key(&ca.key(), passphrase)?;
        let pkcs8 = key.private_key_to_pem_pkcs8().crypto_step(&step)?;
        let pkcs8 = String::from_utf8(pkcs8).crypto_step(&step)?;
        let key_pair = KeyPair::from_pem(&pkcs8).crypto_step(&step)?;
        let issuer = Issuer::from_ca_cert_pem(&cert_pem, &key_pair).crypto_step(&step)?;

        let crlnum_path = ca.crlnum();
        let current = fsutil::read_to_string(&crlnum_path)?;
        let number = u64::from_str_radix(current.trim(), 16).crypto_step(format_args!(
            "read CRL number {}",
            crlnum_path.display()
        ))?;

        let key_identifier_method = ca_cert
            .subject_key_id()
            .map_or(KeyIdMethod::Sha256, |id| {
                KeyIdMethod::PreSpecified(id.as_slice().to_vec())
            });
        let now = time::OffsetDateTime::now_utc();
        let params = CertificateRevocationListParams {
            this_update: now,
            next_update: now + time::Duration::days(CRL_VALIDITY_DAYS),
            crl_number: SerialNumber::from(number),
            issuing_distribution_point: None,
            revoked_certs: Vec::new(),
            key_identifier_method,
        };
        let crl = params
            .signed_by(&issuer)
            .and_then(|crl| crl.pem())
            .crypto_step(&step)?;
        fsutil::write(&crl_path, crl.as_bytes())?;
        fsutil::write(&crlnum_path, format!("{:02X}\n", number + 1).as_bytes())
    }

    fn rsa_to_pkcs1(&self, key_in: &Path, key_out: &Path, passphrase: &Passphrase) -> Result<()> {
        let key = Self::load_key(key_in, passphrase)?;
        let pem = key
            .rsa()
            .and_then(|rsa| rsa.private_key_to_pem())
            .crypto_step(format_args!("convert {} to PKCS#1", key_in.display()))?;
        fsutil::write_key(key_out, &pem)
    }
}

fn x509_name(dn: &DistinguishedName) -> Result<X509Name> {
    let step = "build subject name";
    let mut name = X509Name::builder().crypto_step(step)?;
    name.append_entry_by_nid(Nid::COUNTRYNAME, &dn.country)
        .crypto_step(step)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &dn.organization)
        .crypto_step(step)?;
    name.append_entry_by_nid(Nid::COMMONNAME, &dn.common_name)
        .crypto_step(step)?;
    Ok(name.build())
}

/// `/C=US/O=Org/CN=Name`, the form used in the index ledger.
fn oneline(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("UNDEF");
            let value = String::from_utf8_lossy(entry.data().as_slice());
            format!("/{key}={value}")
        })
        .collect()
}

/// UTCTime before 2050, GeneralizedTime from 2050 on.
fn ledger_time(at: DateTime<Utc>) -> String {
    if at.year() < 2050 {
        at.format("%y%m%d%H%M%SZ").to_string()
    } else {
        at.format("%Y%m%d%H%M%SZ").to_string()
    }
}

fn asn1_time(at: DateTime<Utc>) -> Result<Asn1Time> {
    Asn1Time::from_unix(at.timestamp()).crypto_step(format_args!("encode time {at}"))
}

/// Parsed view of an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    pub subject: String,
    pub issuer: String,
    /// Serial as lowercase hex, no leading zeros
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub policy_oids: Vec<String>,
    pub permitted_dns: Vec<String>,
}

/// Parse the first certificate in a PEM file.
pub fn describe_certificate(path: &Path) -> Result<CertSummary> {
    let step = format!("parse certificate {}", path.display());
    let content = fsutil::read(path)?;
    let pems = pem::parse_many(&content).crypto_step(&step)?;
    let block = pems
        .iter()
        .find(|p| p.tag() == "CERTIFICATE")
        .ok_or_else(|| PkiError::crypto(&step, "no CERTIFICATE block"))?;
    let (_, cert) = x509_parser::parse_x509_certificate(block.contents()).crypto_step(&step)?;

    let mut summary = CertSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.tbs_certificate.serial.to_str_radix(16),
        not_before: timestamp(cert.validity().not_before.timestamp(), &step)?,
        not_after: timestamp(cert.validity().not_after.timestamp(), &step)?,
        is_ca: false,
        policy_oids: Vec::new(),
        permitted_dns: Vec::new(),
    };
    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => summary.is_ca = bc.ca,
            ParsedExtension::CertificatePolicies(policies) => summary
                .policy_oids
                .extend(policies.iter().map(|p| p.policy_id.to_id_string())),
            ParsedExtension::NameConstraints(nc) => {
                for subtree in nc.permitted_subtrees.iter().flatten() {
                    if let GeneralName::DNSName(dns) = &subtree.base {
                        summary.permitted_dns.push(dns.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    Ok(summary)
}

fn timestamp(secs: i64, step: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| PkiError::crypto(step, "validity out of range"))
}
