use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(RequestId, "Opaque unique identifier for a dispatch request.");
newtype_string!(Phone, "An E.164-formatted phone number.");
newtype_string!(IpSubnet, "A privacy-preserving IP subnet derivation (e.g. /24 or /64).");
newtype_string!(CountryCode, "An ISO-3166 alpha-2 country code.");

impl RequestId {
    /// Generate a fresh, random request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The delivery channel used (or requested) for a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Voice,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Voice => "voice",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "voice" => Ok(Self::Voice),
            other => Err(crate::CoreError::UnknownChannel(other.to_owned())),
        }
    }
}

/// Hash an OTP code for storage. Never store the plaintext code.
#[must_use]
pub fn hash_code(code: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a privacy-preserving subnet string from an IP address.
///
/// IPv4 addresses are truncated to a /24, IPv6 to a /64.
#[must_use]
pub fn derive_subnet(ip: &str) -> IpSubnet {
    if let Ok(addr) = ip.parse::<std::net::Ipv4Addr>() {
        let octets = addr.octets();
        return IpSubnet::new(format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2]));
    }
    if let Ok(addr) = ip.parse::<std::net::Ipv6Addr>() {
        let segments = addr.segments();
        return IpSubnet::new(format!(
            "{:x}:{:x}:{:x}:{:x}::/64",
            segments[0], segments[1], segments[2], segments[3]
        ));
    }
    IpSubnet::new(ip.to_owned())
}
