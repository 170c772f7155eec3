//! Subject profiles: DN defaults, SAN rules and subject constraints.

use super::SubjectResolver;
use crate::domain::subject::{
    parse_dns_names, parse_email_addresses, parse_ip_addresses, parse_uris, DistinguishedName,
    ResolvedSubject, SubjectRequest,
};
use crate::infra::error::{CaError, CaResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rules for one SAN type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanPatterns {
    pub allowed: bool,
    pub required: bool,
    pub patterns: Vec<String>,
    /// Zero means unlimited
    pub max_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanConfig {
    pub dns_names: SanPatterns,
    pub ip_addresses: SanPatterns,
    pub email_addresses: SanPatterns,
    pub uris: SanPatterns,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectConstraints {
    pub require_common_name: bool,
    pub require_organization: bool,
    pub require_country: bool,
    pub allow_wildcard: bool,
    pub valid_countries: Vec<String>,
}

/// Subject profile loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectProfile {
    pub name: String,
    pub description: String,
    pub subject: DistinguishedName,
    pub subject_alt_names: SanConfig,
    pub constraints: SubjectConstraints,
}

fn violation(msg: impl Into<String>) -> CaError {
    CaError::SubjectPolicyViolation(msg.into())
}

impl SubjectProfile {
    pub fn load(path: &Path) -> CaResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CaError::ConfigurationError(format!("Failed to read subject profile: {e}"))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> CaResult<Self> {
        let profile: SubjectProfile = serde_yaml::from_str(content).map_err(|e| {
            CaError::ConfigurationError(format!("Failed to parse subject profile YAML: {e}"))
        })?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check the profile itself: name present, patterns compile, country
    /// codes are two letters.
    pub fn validate(&self) -> CaResult<()> {
        if self.name.is_empty() {
            return Err(CaError::InvalidConfig("Profile name is required".into()));
        }
        let sans = &self.subject_alt_names;
        for (label, rules) in [
            ("DNS name", &sans.dns_names),
            ("IP address", &sans.ip_addresses),
            ("email address", &sans.email_addresses),
            ("URI", &sans.uris),
        ] {
            compile_patterns(&rules.patterns)
                .map_err(|e| CaError::InvalidConfig(format!("Invalid {label} pattern: {e}")))?;
        }
        for country in self
            .subject
            .country
            .iter()
            .chain(&self.constraints.valid_countries)
        {
            if country.chars().count() != 2 {
                return Err(CaError::InvalidConfig(format!(
                    "Invalid country code: {country} (must be 2 characters)"
                )));
            }
        }
        Ok(())
    }

    fn resolve_dn(&self, request: &SubjectRequest) -> CaResult<DistinguishedName> {
        let defaults = &self.subject;
        let pick = |requested: &Vec<String>, default: &Vec<String>| {
            if requested.is_empty() {
                default.clone()
            } else {
                requested.clone()
            }
        };

        let common_name = if request.common_name.is_empty() {
            defaults.common_name.clone()
        } else {
            request.common_name.clone()
        };
        if common_name.is_empty() && self.constraints.require_common_name {
            return Err(violation("common name is required"));
        }
        if common_name.starts_with("*.") && !self.constraints.allow_wildcard {
            return Err(violation("wildcard common names are not allowed"));
        }

        let organization = pick(&request.organization, &defaults.organization);
        if organization.is_empty() && self.constraints.require_organization {
            return Err(violation("organization is required"));
        }

        let country = pick(&request.country, &defaults.country);
        if country.is_empty() && self.constraints.require_country {
            return Err(violation("country is required"));
        }
        if !self.constraints.valid_countries.is_empty() {
            if let Some(c) = country
                .iter()
                .find(|c| !self.constraints.valid_countries.contains(c))
            {
                return Err(violation(format!("country {c} is not in allowed list")));
            }
        }

        Ok(DistinguishedName {
            common_name,
            organization,
            organizational_unit: pick(&request.organizational_unit, &defaults.organizational_unit),
            country,
            state: pick(&request.state, &defaults.state),
            locality: pick(&request.locality, &defaults.locality),
            street_address: defaults.street_address.clone(),
            postal_code: defaults.postal_code.clone(),
            serial_number: defaults.serial_number.clone(),
        })
    }

    fn check_san_rules(
        &self,
        (label, plural): (&str, &str),
        values: &[String],
        rules: &SanPatterns,
        check_patterns: bool,
    ) -> CaResult<()> {
        if values.is_empty() {
            if rules.required {
                return Err(violation(format!("at least one {label} is required")));
            }
            return Ok(());
        }
        if !rules.allowed {
            return Err(violation(format!("{plural} are not allowed in this profile")));
        }
        if rules.max_count > 0 && values.len() > rules.max_count {
            return Err(violation(format!(
                "too many {plural}: {} (max {})",
                values.len(),
                rules.max_count
            )));
        }
        if check_patterns && !rules.patterns.is_empty() {
            let patterns = compile_patterns(&rules.patterns)
                .map_err(|e| CaError::InvalidConfig(format!("Invalid {label} pattern: {e}")))?;
            for value in values {
                if !patterns.iter().any(|re| re.is_match(value)) {
                    return Err(violation(format!(
                        "{label} {value} does not match allowed patterns"
                    )));
                }
            }
        }
        Ok(())
    }
}

const DNS: (&str, &str) = ("DNS name", "DNS names");
const IP: (&str, &str) = ("IP address", "IP addresses");
const EMAIL: (&str, &str) = ("email address", "email addresses");
const URI: (&str, &str) = ("URI", "URIs");

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

impl SubjectResolver for SubjectProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, request: &SubjectRequest) -> CaResult<ResolvedSubject> {
        let dn = self.resolve_dn(request)?;
        let sans = &self.subject_alt_names;

        self.check_san_rules(DNS, &request.dns_names, &sans.dns_names, true)?;
        if !self.constraints.allow_wildcard && request.dns_names.iter().any(|d| d.starts_with("*.")) {
            return Err(violation("wildcard DNS names are not allowed"));
        }

        self.check_san_rules(IP, &request.ip_addresses, &sans.ip_addresses, false)?;
        let ip_addresses = parse_ip_addresses(&request.ip_addresses)?;

        self.check_san_rules(EMAIL, &request.email_addresses, &sans.email_addresses, true)?;

        self.check_san_rules(URI, &request.uris, &sans.uris, true)?;
        let uris = parse_uris(&request.uris)?;

        Ok(ResolvedSubject {
            dn,
            dns_names: parse_dns_names(&request.dns_names)?,
            ip_addresses,
            email_addresses: parse_email_addresses(&request.email_addresses)?,
            uris,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TLS_SERVER_PROFILE: &str = r#"
name: tls-server
description: TLS server certificates
subject:
  organization: ["Example Corp"]
  country: ["US"]
subject_alt_names:
  dns_names:
    allowed: true
    required: true
    patterns: ['^[a-z0-9.-]+\.example\.com$']
    max_count: 2
  ip_addresses:
    allowed: true
constraints:
  require_common_name: true
  valid_countries: ["US", "CA"]
"#;

    fn profile() -> SubjectProfile {
        SubjectProfile::from_yaml_str(TLS_SERVER_PROFILE).unwrap()
    }

    fn request(cn: &str, dns: &[&str]) -> SubjectRequest {
        SubjectRequest {
            common_name: cn.into(),
            dns_names: dns.iter().map(|s| s.to_string()).collect(),
            ..SubjectRequest::default()
        }
    }

    #[test]
    fn test_defaults_are_applied() {
        let resolved = profile()
            .resolve(&request("svc.example.com", &["svc.example.com"]))
            .unwrap();
        assert_eq!(resolved.dn.organization, vec!["Example Corp"]);
        assert_eq!(resolved.dn.country, vec!["US"]);
    }

    #[test]
    fn test_missing_common_name() {
        let err = profile().resolve(&request("", &["svc.example.com"])).unwrap_err();
        assert!(err.to_string().contains("common name is required"));
    }

    #[test]
    fn test_pattern_and_count_limits() {
        let p = profile();
        assert!(p.resolve(&request("a", &["svc.other.org"])).is_err());
        assert!(p
            .resolve(&request("a", &["a.example.com", "b.example.com", "c.example.com"]))
            .unwrap_err()
            .to_string()
            .contains("too many DNS names"));
        assert!(p
            .resolve(&request("a", &[]))
            .unwrap_err()
            .to_string()
            .contains("at least one DNS name is required"));
    }

    #[test]
    fn test_disallowed_country_and_wildcard() {
        let p = profile();
        let mut req = request("svc.example.com", &["svc.example.com"]);
        req.country = vec!["FR".into()];
        assert!(p.resolve(&req).unwrap_err().to_string().contains("not in allowed list"));

        let wildcard = request("*.example.com", &["svc.example.com"]);
        assert!(matches!(
            p.resolve(&wildcard),
            Err(CaError::SubjectPolicyViolation(_))
        ));
    }

    #[test]
    fn test_emails_not_allowed() {
        let mut req = request("svc.example.com", &["svc.example.com"]);
        req.email_addresses = vec!["ops@example.com".into()];
        assert!(profile()
            .resolve(&req)
            .unwrap_err()
            .to_string()
            .contains("email addresses are not allowed"));
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let bad = "name: broken\nsubject_alt_names:\n  dns_names:\n    patterns: ['(unclosed']\n";
        assert!(matches!(
            SubjectProfile::from_yaml_str(bad),
            Err(CaError::InvalidConfig(_))
        ));
        assert!(SubjectProfile::from_yaml_str("description: nameless\n").is_err());
    }
}
