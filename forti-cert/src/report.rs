//! Decoding and rendering of a fetched certificate.
//!
//! [`CertReport::parse`] turns the PEM text returned by the appliance into
//! a flat, owned view of the fields the report cares about; everything
//! library-specific (DER time representations, OID-keyed extensions,
//! ASN.1 string variants) is normalized at that boundary and never leaks
//! past it.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use const_oid::db::{rfc4519, rfc5280, DB};
use der::asn1::{
    Any, Ia5StringRef, ObjectIdentifier, PrintableStringRef, TeletexStringRef, Utf8StringRef,
};
use der::{Decode, DecodePem};
use thiserror::Error;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{KeyUsage, KeyUsages, SubjectAltName};
use x509_cert::name::Name;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::rpc::CertRef;

/// Possible errors while decoding a fetched certificate.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed PEM or DER.
    #[error("bad certificate encoding")]
    Encoding(#[from] der::Error),

    /// A validity timestamp outside the representable range.
    #[error("certificate timestamp out of range")]
    Timestamp,
}

/// `emailAddress` attribute (PKCS#9), common in appliance-issued subjects.
const EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Short labels for the distinguished-name attributes seen in practice;
/// anything else falls back to the OID database.
const DN_SHORT_NAMES: &[(ObjectIdentifier, &str)] = &[
    (rfc4519::CN, "CN"),
    (rfc4519::O, "O"),
    (rfc4519::OU, "OU"),
    (rfc4519::C, "C"),
    (rfc4519::ST, "ST"),
    (rfc4519::L, "L"),
    (rfc4519::DC, "DC"),
    (EMAIL_ADDRESS, "emailAddress"),
];

/// The key-usage bits this report tracks, as plain booleans.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeyUsageFlags {
    /// `digitalSignature`
    pub digital_signature: bool,
    /// `keyEncipherment`
    pub key_encipherment: bool,
    /// `keyAgreement`
    pub key_agreement: bool,
    /// `keyCertSign`
    pub key_cert_sign: bool,
    /// `cRLSign`
    pub crl_sign: bool,
}

impl KeyUsageFlags {
    /// Human-readable names of the set flags, in canonical bit order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.digital_signature {
            names.push("Digital Signature");
        }
        if self.key_encipherment {
            names.push("Key Encipherment");
        }
        if self.key_agreement {
            names.push("Key Agreement");
        }
        if self.key_cert_sign {
            names.push("Certificate Signing");
        }
        if self.crl_sign {
            names.push("CRL Signing");
        }
        names
    }
}

impl From<KeyUsage> for KeyUsageFlags {
    fn from(usage: KeyUsage) -> Self {
        Self {
            digital_signature: usage.0.contains(KeyUsages::DigitalSignature),
            key_encipherment: usage.0.contains(KeyUsages::KeyEncipherment),
            key_agreement: usage.0.contains(KeyUsages::KeyAgreement),
            key_cert_sign: usage.0.contains(KeyUsages::KeyCertSign),
            crl_sign: usage.0.contains(KeyUsages::CRLSign),
        }
    }
}

/// Read-only view over one decoded certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertReport {
    /// Subject attributes, in the certificate's own order.
    pub subject: Vec<(String, String)>,
    /// Issuer attributes, same shape as `subject`.
    pub issuer: Vec<(String, String)>,
    /// Serial number as lowercase hex.
    pub serial: String,
    /// Start of the validity interval.
    pub not_before: DateTime<Utc>,
    /// End of the validity interval.
    pub not_after: DateTime<Utc>,
    /// Signature algorithm name, or its dotted OID when unrecognized.
    pub signature_algorithm: String,
    /// Subject Alternative Name entries; empty when the extension is absent.
    pub san: Vec<String>,
    /// Key-usage flags; `None` when the extension is absent.
    pub key_usage: Option<KeyUsageFlags>,
}

impl CertReport {
    /// Decodes a PEM-encoded certificate. Malformed input yields a
    /// [`DecodeError`] and no partial result.
    pub fn parse(pem: &str) -> Result<Self, DecodeError> {
        let cert = Certificate::from_pem(pem)?;
        let tbs = &cert.tbs_certificate;

        let mut san = Vec::new();
        let mut key_usage = None;
        if let Some(extensions) = &tbs.extensions {
            for extension in extensions {
                let value = extension.extn_value.as_bytes();
                if extension.extn_id == rfc5280::ID_CE_SUBJECT_ALT_NAME {
                    let SubjectAltName(names) = SubjectAltName::from_der(value)?;
                    san = names.iter().map(general_name_string).collect();
                } else if extension.extn_id == rfc5280::ID_CE_KEY_USAGE {
                    key_usage = Some(KeyUsage::from_der(value)?.into());
                }
            }
        }

        Ok(Self {
            subject: name_attributes(&tbs.subject),
            issuer: name_attributes(&tbs.issuer),
            serial: hex::encode(tbs.serial_number.as_bytes()),
            not_before: to_utc(&tbs.validity.not_before)?,
            not_after: to_utc(&tbs.validity.not_after)?,
            signature_algorithm: oid_name(&cert.signature_algorithm.oid),
            san,
            key_usage,
        })
    }

    /// Whether `now` falls inside the closed interval
    /// `[not_before, not_after]`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Renders the report in its fixed field order. Absent SAN and
    /// key-usage extensions print the literal `None` placeholder.
    pub fn render(&self, cert: &CertRef, now: DateTime<Utc>) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Certificate Details ({}: {})",
            cert.kind.label(),
            cert.name
        ));
        let verdict = if self.is_valid_at(now) {
            "Valid ✓"
        } else {
            "Expired or Not Yet Valid ✗"
        };
        lines.push(format!("Status: {verdict}"));
        lines.push(format!("Serial Number: {}", self.serial));
        lines.push(format!("Not Valid Before: {}", fmt_instant(self.not_before)));
        lines.push(format!("Not Valid After: {}", fmt_instant(self.not_after)));
        lines.push(format!("Signature Algorithm: {}", self.signature_algorithm));

        lines.push(String::new());
        lines.push("Subject:".to_owned());
        push_attributes(&mut lines, &self.subject);

        lines.push(String::new());
        lines.push("Issuer:".to_owned());
        push_attributes(&mut lines, &self.issuer);

        lines.push(String::new());
        lines.push("Subject Alternative Names:".to_owned());
        if self.san.is_empty() {
            lines.push("  None".to_owned());
        } else {
            for name in &self.san {
                lines.push(format!("  - {name}"));
            }
        }

        lines.push(String::new());
        lines.push("Key Usage:".to_owned());
        let usages = self
            .key_usage
            .as_ref()
            .map(KeyUsageFlags::names)
            .unwrap_or_default();
        if usages.is_empty() {
            lines.push("  None".to_owned());
        } else {
            for usage in usages {
                lines.push(format!("  - {usage}"));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

/// Normalizes both DER time representations to a UTC-aware instant. This
/// is the only place that touches the library's time types.
fn to_utc(time: &Time) -> Result<DateTime<Utc>, DecodeError> {
    let unix = match time {
        Time::UtcTime(t) => t.to_unix_duration(),
        Time::GeneralTime(t) => t.to_unix_duration(),
    };
    DateTime::from_timestamp(unix.as_secs() as i64, unix.subsec_nanos())
        .ok_or(DecodeError::Timestamp)
}

fn fmt_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

fn push_attributes(lines: &mut Vec<String>, attributes: &[(String, String)]) {
    if attributes.is_empty() {
        lines.push("  None".to_owned());
    } else {
        for (attr, value) in attributes {
            lines.push(format!("  {attr} = {value}"));
        }
    }
}

/// Flattens a distinguished name into labeled attribute pairs, preserving
/// the certificate's own ordering.
fn name_attributes(name: &Name) -> Vec<(String, String)> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .map(|atv| (attr_type_label(&atv.oid), attr_value_string(&atv.value)))
        .collect()
}

fn attr_type_label(oid: &ObjectIdentifier) -> String {
    DN_SHORT_NAMES
        .iter()
        .find(|(known, _)| known == oid)
        .map(|(_, label)| (*label).to_owned())
        .unwrap_or_else(|| oid_name(oid))
}

/// Decodes a directory-string attribute value, whatever ASN.1 string type
/// it was encoded as; undecodable values fall back to hex.
fn attr_value_string(value: &Any) -> String {
    if let Ok(s) = value.decode_as::<Utf8StringRef>() {
        return s.to_string();
    }
    if let Ok(s) = value.decode_as::<PrintableStringRef>() {
        return s.to_string();
    }
    if let Ok(s) = value.decode_as::<Ia5StringRef>() {
        return s.to_string();
    }
    if let Ok(s) = value.decode_as::<TeletexStringRef>() {
        return s.to_string();
    }
    hex::encode(value.value())
}

fn oid_name(oid: &ObjectIdentifier) -> String {
    match DB.by_oid(oid) {
        Some(name) => name.to_owned(),
        None => oid.to_string(),
    }
}

fn general_name_string(name: &GeneralName) -> String {
    match name {
        GeneralName::DnsName(dns) => format!("DNS:{dns}"),
        GeneralName::Rfc822Name(email) => format!("email:{email}"),
        GeneralName::UniformResourceIdentifier(uri) => format!("URI:{uri}"),
        GeneralName::DirectoryName(dir) => format!("dirName:{dir}"),
        GeneralName::IpAddress(octets) => {
            let bytes = octets.as_bytes();
            if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
                format!("IP:{}", Ipv4Addr::from(v4))
            } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
                format!("IP:{}", Ipv6Addr::from(v6))
            } else {
                format!("IP:{}", hex::encode(bytes))
            }
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::CertType;
    use chrono::TimeZone;
    use der::asn1::{BitString, Ia5String, OctetString, SetOfVec};
    use der::{Encode, EncodePem};
    use x509_cert::attr::AttributeTypeAndValue;
    use x509_cert::certificate::{TbsCertificate, Version};
    use x509_cert::ext::Extension;
    use x509_cert::name::{RdnSequence, RelativeDistinguishedName};
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
    use x509_cert::time::Validity;

    /// sha256WithRSAEncryption
    const SIG_ALG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
    /// id-Ed25519
    const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

    fn utf8_value(text: &str) -> Any {
        Any::encode_from(&Utf8StringRef::new(text).unwrap()).unwrap()
    }

    fn name(parts: &[(ObjectIdentifier, &str)]) -> Name {
        let rdns = parts
            .iter()
            .map(|(oid, value)| {
                let atv = AttributeTypeAndValue {
                    oid: *oid,
                    value: utf8_value(value),
                };
                RelativeDistinguishedName(SetOfVec::try_from(vec![atv]).unwrap())
            })
            .collect();
        RdnSequence(rdns)
    }

    fn san_extension() -> Extension {
        let san = SubjectAltName(vec![
            GeneralName::DnsName(Ia5String::new("alt.example.com").unwrap()),
            GeneralName::IpAddress(OctetString::new(vec![10, 0, 0, 1]).unwrap()),
        ]);
        Extension {
            extn_id: rfc5280::ID_CE_SUBJECT_ALT_NAME,
            critical: false,
            extn_value: OctetString::new(san.to_der().unwrap()).unwrap(),
        }
    }

    fn key_usage_extension(usage: KeyUsage) -> Extension {
        Extension {
            extn_id: rfc5280::ID_CE_KEY_USAGE,
            critical: true,
            extn_value: OctetString::new(usage.to_der().unwrap()).unwrap(),
        }
    }

    /// A validity window crossing the 2050 UTCTime cutoff, so the two DER
    /// time representations are both exercised.
    fn validity() -> Validity {
        Validity {
            // UTCTime 2024-01-15 00:00:00Z
            not_before: Time::from_der(b"\x17\x0d240115000000Z").unwrap(),
            // GeneralizedTime 2052-01-15 00:00:00Z
            not_after: Time::from_der(b"\x18\x0f20520115000000Z").unwrap(),
        }
    }

    fn test_certificate(extensions: Option<Vec<Extension>>) -> Certificate {
        let signature_algorithm = AlgorithmIdentifierOwned {
            oid: SIG_ALG,
            parameters: None,
        };
        Certificate {
            tbs_certificate: TbsCertificate {
                version: Version::V3,
                serial_number: SerialNumber::new(&[0x01, 0xf4]).unwrap(),
                signature: signature_algorithm.clone(),
                issuer: name(&[
                    (rfc4519::CN, "Test Root CA"),
                    (rfc4519::O, "Example Networks"),
                ]),
                validity: validity(),
                subject: name(&[(rfc4519::CN, "fw.example.com")]),
                subject_public_key_info: SubjectPublicKeyInfoOwned {
                    algorithm: AlgorithmIdentifierOwned {
                        oid: ED25519,
                        parameters: None,
                    },
                    subject_public_key: BitString::from_bytes(&[0u8; 32]).unwrap(),
                },
                issuer_unique_id: None,
                subject_unique_id: None,
                extensions,
            },
            signature_algorithm,
            signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
        }
    }

    fn pem(cert: &Certificate) -> String {
        cert.to_pem(der::pem::LineEnding::LF).unwrap()
    }

    fn ca_ref() -> CertRef {
        CertRef {
            kind: CertType::Ca,
            name: "root-ca".to_owned(),
        }
    }

    #[test]
    fn parse_reads_core_fields() {
        let report = CertReport::parse(&pem(&test_certificate(None))).unwrap();
        assert_eq!(
            report.subject,
            vec![("CN".to_owned(), "fw.example.com".to_owned())]
        );
        assert_eq!(
            report.issuer,
            vec![
                ("CN".to_owned(), "Test Root CA".to_owned()),
                ("O".to_owned(), "Example Networks".to_owned()),
            ]
        );
        assert_eq!(report.serial, "01f4");
        assert_eq!(
            report.not_before,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            report.not_after,
            Utc.with_ymd_and_hms(2052, 1, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(report.signature_algorithm, oid_name(&SIG_ALG));
        assert!(report.san.is_empty());
        assert!(report.key_usage.is_none());
    }

    #[test]
    fn parse_is_pure() {
        let text = pem(&test_certificate(Some(vec![san_extension()])));
        assert_eq!(
            CertReport::parse(&text).unwrap(),
            CertReport::parse(&text).unwrap()
        );
    }

    #[test]
    fn malformed_pem_is_a_decode_error() {
        assert!(matches!(
            CertReport::parse("-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n"),
            Err(DecodeError::Encoding(_))
        ));
        assert!(CertReport::parse("").is_err());
    }

    #[test]
    fn san_and_key_usage_are_extracted() {
        let cert = test_certificate(Some(vec![
            san_extension(),
            key_usage_extension(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
            )),
        ]));
        let report = CertReport::parse(&pem(&cert)).unwrap();
        assert_eq!(
            report.san,
            vec!["DNS:alt.example.com".to_owned(), "IP:10.0.0.1".to_owned()]
        );
        assert_eq!(
            report.key_usage.unwrap().names(),
            vec!["Digital Signature", "Key Encipherment"]
        );
    }

    #[test]
    fn validity_interval_is_closed() {
        let report = CertReport::parse(&pem(&test_certificate(None))).unwrap();
        assert!(report.is_valid_at(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()));
        assert!(report.is_valid_at(Utc.with_ymd_and_hms(2052, 1, 15, 0, 0, 0).unwrap()));
        assert!(!report.is_valid_at(Utc.with_ymd_and_hms(2024, 1, 14, 23, 59, 59).unwrap()));
        assert!(!report.is_valid_at(Utc.with_ymd_and_hms(2052, 1, 15, 0, 0, 1).unwrap()));
    }

    #[test]
    fn render_is_deterministic_and_ordered() {
        let cert = test_certificate(Some(vec![
            san_extension(),
            key_usage_extension(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
            )),
        ]));
        let report = CertReport::parse(&pem(&cert)).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let sig_line = format!("Signature Algorithm: {}", report.signature_algorithm);
        let expected = [
            "Certificate Details (CA: root-ca)",
            "Status: Valid ✓",
            "Serial Number: 01f4",
            "Not Valid Before: 2024-01-15 00:00:00 UTC",
            "Not Valid After: 2052-01-15 00:00:00 UTC",
            sig_line.as_str(),
            "",
            "Subject:",
            "  CN = fw.example.com",
            "",
            "Issuer:",
            "  CN = Test Root CA",
            "  O = Example Networks",
            "",
            "Subject Alternative Names:",
            "  - DNS:alt.example.com",
            "  - IP:10.0.0.1",
            "",
            "Key Usage:",
            "  - Digital Signature",
            "  - Key Encipherment",
            "",
        ]
        .join("\n");
        assert_eq!(report.render(&ca_ref(), now), expected);
    }

    #[test]
    fn expired_certificate_gets_the_two_state_label() {
        let report = CertReport::parse(&pem(&test_certificate(None))).unwrap();
        let rendered = report.render(&ca_ref(), Utc.with_ymd_and_hms(2060, 1, 1, 0, 0, 0).unwrap());
        assert!(rendered.contains("Status: Expired or Not Yet Valid ✗"));
    }

    #[test]
    fn absent_extensions_render_none_placeholders() {
        let report = CertReport::parse(&pem(&test_certificate(None))).unwrap();
        let rendered = report.render(&ca_ref(), Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert!(rendered.contains("Subject Alternative Names:\n  None"));
        assert!(rendered.contains("Key Usage:\n  None"));
    }

    #[test]
    fn untracked_key_usage_flags_render_none() {
        let cert = test_certificate(Some(vec![key_usage_extension(KeyUsage(
            KeyUsages::DataEncipherment.into(),
        ))]));
        let report = CertReport::parse(&pem(&cert)).unwrap();
        let rendered = report.render(&ca_ref(), Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert!(rendered.contains("Key Usage:\n  None"));
    }

    #[test]
    fn unknown_oids_fall_back_to_dotted_form() {
        let oid = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1");
        assert_eq!(oid_name(&oid), "1.3.6.1.4.1.99999.1");
    }
}
