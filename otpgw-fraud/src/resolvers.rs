//! External-collaborator interfaces the Fraud Engine derives fields from
//! (spec §1 "out of scope: external collaborators", consumed via §6). The
//! concrete geo-IP database, ASN feed, and carrier lookup service are not
//! part of this system; only the seam is.

use async_trait::async_trait;
use otpgw_core::CountryCode;

/// Resolves the Autonomous System Number owning an IP address (rule R1).
#[async_trait]
pub trait AsnResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Option<u32>;
}

/// Resolves the country an IP address geolocates to.
#[async_trait]
pub trait GeoIpResolver: Send + Sync {
    async fn country_for_ip(&self, ip: &str) -> Option<CountryCode>;
}

/// Derives the calling-code country and a short routing prefix from an
/// E.164 number.
pub trait PhoneIntelligence: Send + Sync {
    fn country_and_prefix(&self, phone: &str) -> (Option<CountryCode>, Option<String>);
}

/// A resolver that never matches anything -- the safe default when no ASN
/// feed is configured. Every call resolves to "unknown", so rule R1 simply
/// never fires rather than blocking everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAsnResolver;

#[async_trait]
impl AsnResolver for NullAsnResolver {
    async fn resolve(&self, _ip: &str) -> Option<u32> {
        None
    }
}

/// A geo resolver that never matches. Useful for tests and for deployments
/// without a geo-IP database; R7 (geo mismatch) never fires since it
/// requires both countries to be known.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGeoIpResolver;

#[async_trait]
impl GeoIpResolver for NullGeoIpResolver {
    async fn country_for_ip(&self, _ip: &str) -> Option<CountryCode> {
        None
    }
}

/// Minimal E.164 calling-code table covering the prefixes exercised by the
/// test suite and common deployments. A production deployment would swap
/// this for a full carrier/number-plan database without otpgw-fraud caring.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallingCodeTable;

const CALLING_CODES: &[(&str, &str)] = &[
    ("1", "US"),
    ("44", "GB"),
    ("33", "FR"),
    ("49", "DE"),
    ("91", "IN"),
    ("81", "JP"),
    ("86", "CN"),
    ("61", "AU"),
    ("55", "BR"),
    ("27", "ZA"),
    ("234", "NG"),
    ("971", "AE"),
];

impl PhoneIntelligence for CallingCodeTable {
    fn country_and_prefix(&self, phone: &str) -> (Option<CountryCode>, Option<String>) {
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        let mut best: Option<(&str, &str)> = None;
        for &(code, country) in CALLING_CODES {
            if digits.starts_with(code) && best.is_none_or(|(b, _)| code.len() > b.len()) {
                best = Some((code, country));
            }
        }
        match best {
            Some((code, country)) => (Some(CountryCode::new(country)), Some(code.to_owned())),
            None => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_calling_codes() {
        let table = CallingCodeTable;
        let (country, prefix) = table.country_and_prefix("+14155551234");
        assert_eq!(country.unwrap().as_str(), "US");
        assert_eq!(prefix.unwrap(), "1");
    }

    #[test]
    fn unknown_prefix_resolves_to_none() {
        let table = CallingCodeTable;
        let (country, prefix) = table.country_and_prefix("+000000000");
        assert!(country.is_none());
        assert!(prefix.is_none());
    }

    #[test]
    fn prefers_longest_matching_prefix() {
        let table = CallingCodeTable;
        let (country, _) = table.country_and_prefix("+971501234567");
        assert_eq!(country.unwrap().as_str(), "AE");
    }
}
