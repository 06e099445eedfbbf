//! Deletion targets
//!
//! A cookie can only be deleted by repeating the exact Domain and Path it
//! was set with, and neither is visible through `document.cookie`. The
//! sweeper therefore tries a fixed matrix of plausible combinations. Cookies
//! set with attributes outside the matrix survive.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Second-level labels that act as public suffixes under a ccTLD
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu", "ne", "or"];

/// Breadth of the Domain attribute matrix tried on deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainMatrix {
    /// no Domain, host, `.host`, apex, `.apex`
    #[default]
    Full,
    /// no Domain, host, `.host`
    HostOnly,
}

impl DomainMatrix {
    /// Domain attribute values to try, `None` meaning "omit the attribute"
    pub fn domains(&self, host: &str) -> Vec<Option<String>> {
        let mut domains = vec![None, Some(host.to_string()), Some(format!(".{}", host))];

        if *self == DomainMatrix::Full {
            let apex = registrable_domain(host);
            if apex != host {
                domains.push(Some(apex.to_string()));
                domains.push(Some(format!(".{}", apex)));
            }
        }

        domains
    }

    /// Path attribute values to try
    pub fn paths(&self) -> [Option<&'static str>; 2] {
        [Some("/"), None]
    }
}

/// Registrable domain of `host` (simplified: no public suffix list).
/// `www.shop.example.com` → `example.com`, `www.example.co.uk` → `example.co.uk`.
pub fn registrable_domain(host: &str) -> &str {
    if host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let parts: Vec<&str> = host.split('.').collect();
    let len = parts.len();
    if len <= 2 {
        return host;
    }

    let keep = if parts[len - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&parts[len - 2]) {
        3
    } else {
        2
    };

    let suffix_len = parts[len - keep..].join(".").len();
    &host[host.len() - suffix_len..]
}
