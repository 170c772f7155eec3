//! Subject requests, distinguished names and parsed Subject Alternative Names.

use crate::infra::error::{CaError, CaResult};
use openssl::nid::Nid;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Extension, X509Name, X509NameBuilder, X509v3Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use url::Url;

/// Raw subject as supplied by a requester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectRequest {
    pub common_name: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub state: Vec<String>,
    pub locality: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<String>,
}

impl SubjectRequest {
    #[must_use]
    pub fn with_common_name(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            ..Self::default()
        }
    }
}

/// X.509 distinguished name components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistinguishedName {
    pub common_name: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub state: Vec<String>,
    pub locality: Vec<String>,
    pub street_address: Vec<String>,
    pub postal_code: Vec<String>,
    pub serial_number: String,
}

impl DistinguishedName {
    #[must_use]
    pub fn common_name(cn: &str) -> Self {
        Self {
            common_name: cn.to_string(),
            ..Self::default()
        }
    }

    /// Attributes in RFC 4514 reading order reversed (most general first),
    /// which is the order they are encoded in.
    fn attributes(&self) -> Vec<(Nid, &str)> {
        let mut attrs = Vec::new();
        attrs.extend(self.country.iter().map(|v| (Nid::COUNTRYNAME, v.as_str())));
        attrs.extend(self.state.iter().map(|v| (Nid::STATEORPROVINCENAME, v.as_str())));
        attrs.extend(self.locality.iter().map(|v| (Nid::LOCALITYNAME, v.as_str())));
        attrs.extend(self.street_address.iter().map(|v| (Nid::STREETADDRESS, v.as_str())));
        attrs.extend(self.postal_code.iter().map(|v| (Nid::POSTALCODE, v.as_str())));
        attrs.extend(self.organization.iter().map(|v| (Nid::ORGANIZATIONNAME, v.as_str())));
        attrs.extend(
            self.organizational_unit
                .iter()
                .map(|v| (Nid::ORGANIZATIONALUNITNAME, v.as_str())),
        );
        if !self.serial_number.is_empty() {
            attrs.push((Nid::SERIALNUMBER, self.serial_number.as_str()));
        }
        if !self.common_name.is_empty() {
            attrs.push((Nid::COMMONNAME, self.common_name.as_str()));
        }
        attrs
    }

    pub fn to_x509_name(&self) -> CaResult<X509Name> {
        let mut builder = X509NameBuilder::new()?;
        for (nid, value) in self.attributes() {
            builder.append_entry_by_nid(nid, value).map_err(|e| {
                CaError::SubjectPolicyViolation(format!("Invalid {} value '{value}': {e}", nid_label(nid)))
            })?;
        }
        Ok(builder.build())
    }
}

fn nid_label(nid: Nid) -> &'static str {
    match nid {
        Nid::COUNTRYNAME => "C",
        Nid::STATEORPROVINCENAME => "ST",
        Nid::LOCALITYNAME => "L",
        Nid::STREETADDRESS => "street",
        Nid::POSTALCODE => "postalCode",
        Nid::ORGANIZATIONNAME => "O",
        Nid::ORGANIZATIONALUNITNAME => "OU",
        Nid::SERIALNUMBER => "serialNumber",
        _ => "CN",
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attributes()
            .into_iter()
            .rev()
            .map(|(nid, v)| format!("{}={v}", nid_label(nid)))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Validated subject ready to be placed in a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSubject {
    pub dn: DistinguishedName,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<Url>,
}

impl ResolvedSubject {
    /// Build straight from a request without profile policy. Every SAN entry
    /// must be well formed; a single bad entry fails the whole request.
    pub fn from_request(request: &SubjectRequest) -> CaResult<Self> {
        Ok(Self {
            dn: DistinguishedName {
                common_name: request.common_name.clone(),
                organization: request.organization.clone(),
                organizational_unit: request.organizational_unit.clone(),
                country: request.country.clone(),
                state: request.state.clone(),
                locality: request.locality.clone(),
                ..DistinguishedName::default()
            },
            dns_names: parse_dns_names(&request.dns_names)?,
            ip_addresses: parse_ip_addresses(&request.ip_addresses)?,
            email_addresses: parse_email_addresses(&request.email_addresses)?,
            uris: parse_uris(&request.uris)?,
        })
    }

    #[must_use]
    pub fn has_alt_names(&self) -> bool {
        !(self.dns_names.is_empty()
            && self.ip_addresses.is_empty()
            && self.email_addresses.is_empty()
            && self.uris.is_empty())
    }

    /// SAN list formatted as `DNS:`, `IP:`, `email:`, `URI:` entries.
    #[must_use]
    pub fn alt_name_strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        out.extend(self.dns_names.iter().map(|d| format!("DNS:{d}")));
        out.extend(self.ip_addresses.iter().map(|ip| format!("IP:{ip}")));
        out.extend(self.email_addresses.iter().map(|e| format!("email:{e}")));
        out.extend(self.uris.iter().map(|u| format!("URI:{u}")));
        out
    }

    /// `subjectAltName` extension, or `None` when there are no SANs.
    pub fn alt_name_extension(&self, ctx: &X509v3Context<'_>) -> CaResult<Option<X509Extension>> {
        if !self.has_alt_names() {
            return Ok(None);
        }
        let mut san = SubjectAlternativeName::new();
        for dns in &self.dns_names {
            san.dns(dns);
        }
        for ip in &self.ip_addresses {
            san.ip(&ip.to_string());
        }
        for email in &self.email_addresses {
            san.email(email);
        }
        for uri in &self.uris {
            san.uri(uri.as_str());
        }
        Ok(Some(san.build(ctx)?))
    }
}

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_DNS_LABEL_LEN: usize = 63;

/// Hostnames (LDH labels), optionally with a single leading `*.` wildcard.
pub fn parse_dns_names(values: &[String]) -> CaResult<Vec<String>> {
    values
        .iter()
        .map(|value| {
            let host = value.strip_prefix("*.").unwrap_or(value);
            if is_hostname(host) {
                Ok(value.clone())
            } else {
                Err(CaError::InvalidRequest(format!("invalid DNS name: {value:?}")))
            }
        })
        .collect()
}

/// `local@domain` with a hostname domain and no separators in the local part.
pub fn parse_email_addresses(values: &[String]) -> CaResult<Vec<String>> {
    values
        .iter()
        .map(|value| {
            let valid = value.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !local
                        .chars()
                        .any(|c| c == '@' || c == ',' || c.is_whitespace() || c.is_control())
                    && is_hostname(domain)
            });
            if valid {
                Ok(value.clone())
            } else {
                Err(CaError::InvalidRequest(format!("invalid email address: {value:?}")))
            }
        })
        .collect()
}

fn is_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_DNS_NAME_LEN
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_DNS_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

pub fn parse_ip_addresses(values: &[String]) -> CaResult<Vec<IpAddr>> {
    values
        .iter()
        .map(|value| {
            value
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| CaError::InvalidIpAddress(value.clone()))
        })
        .collect()
}

/// URIs must be absolute (carry a scheme).
pub fn parse_uris(values: &[String]) -> CaResult<Vec<Url>> {
    values
        .iter()
        .map(|value| {
            Url::parse(value).map_err(|e| CaError::InvalidUri {
                uri: value.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_request_parses_sans() {
        let request = SubjectRequest {
            common_name: "svc.example.com".into(),
            dns_names: vec!["svc.example.com".into()],
            ip_addresses: vec!["10.0.0.1".into(), "::1".into()],
            email_addresses: vec!["ops@example.com".into()],
            uris: vec!["spiffe://example.com/svc".into()],
            ..SubjectRequest::default()
        };
        let resolved = ResolvedSubject::from_request(&request).unwrap();

        assert_eq!(
            resolved.alt_name_strings(),
            vec![
                "DNS:svc.example.com",
                "IP:10.0.0.1",
                "IP:::1",
                "email:ops@example.com",
                "URI:spiffe://example.com/svc",
            ]
        );
    }

    #[test]
    fn test_single_bad_ip_fails_request() {
        let request = SubjectRequest {
            common_name: "svc".into(),
            ip_addresses: vec!["10.0.0.1".into(), "not-an-ip".into()],
            ..SubjectRequest::default()
        };
        match ResolvedSubject::from_request(&request) {
            Err(CaError::InvalidIpAddress(value)) => assert_eq!(value, "not-an-ip"),
            other => panic!("Expected InvalidIpAddress, got: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_dns_and_email_are_rejected() {
        for dns in ["a.com,DNS:b", "", "bad..example.com", "-lead.example.com", "sp ace.com"] {
            let request = SubjectRequest {
                common_name: "svc".into(),
                dns_names: vec!["ok.example.com".into(), dns.into()],
                ..SubjectRequest::default()
            };
            assert!(
                matches!(ResolvedSubject::from_request(&request), Err(CaError::InvalidRequest(_))),
                "{dns:?} accepted"
            );
        }

        for email in ["ops", "ops@", "@example.com", "a@b@example.com", "ops@example.com,DNS:x"] {
            let request = SubjectRequest {
                common_name: "svc".into(),
                email_addresses: vec![email.into()],
                ..SubjectRequest::default()
            };
            assert!(
                matches!(ResolvedSubject::from_request(&request), Err(CaError::InvalidRequest(_))),
                "{email:?} accepted"
            );
        }

        let request = SubjectRequest {
            common_name: "svc".into(),
            dns_names: vec!["*.example.com".into(), "xn--bcher-kva.example".into()],
            email_addresses: vec!["first.last+tag@mail.example.com".into()],
            ..SubjectRequest::default()
        };
        let resolved = ResolvedSubject::from_request(&request).unwrap();
        assert_eq!(resolved.dns_names.len(), 2);
    }

    #[test]
    fn test_relative_uri_is_rejected() {
        let request = SubjectRequest {
            common_name: "svc".into(),
            uris: vec!["just/a/path".into()],
            ..SubjectRequest::default()
        };
        assert!(matches!(
            ResolvedSubject::from_request(&request),
            Err(CaError::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_dn_display_and_name() {
        let dn = DistinguishedName {
            common_name: "Root".into(),
            organization: vec!["Example".into()],
            country: vec!["US".into()],
            ..DistinguishedName::default()
        };
        assert_eq!(dn.to_string(), "CN=Root,O=Example,C=US");

        let name = dn.to_x509_name().unwrap();
        let cn = name.entries_by_nid(Nid::COMMONNAME).next().unwrap();
        assert_eq!(String::from_utf8(cn.data().as_slice().to_vec()).unwrap(), "Root");
    }
}
