//! Cookie and script classification
//!
//! Tables are ordered; the first match wins and analytics is always
//! consulted before marketing so overlapping names resolve deterministically.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::category::CategoryId;

/// Known analytics cookie names
const ANALYTICS_COOKIES: &[&str] = &[
    // Google Analytics / Tag Manager
    r"^_ga",
    r"^_gid$",
    r"^_gat",
    r"^_gcl_au$",
    r"^__utm",
    r"^_dc_gtm",
    r"^_gac_",
    r"^_gtm",
    r"^AMP_TOKEN",
    // Microsoft UET
    r"^_uet",
    // Generic
    r"^analytics",
    r"^ga_",
    r"^gid_",
    r"^collect$",
    // VWO
    r"^_vwo",
];

/// Known marketing cookie names
const MARKETING_COOKIES: &[&str] = &[
    // Facebook
    r"^_fbp",
    r"^fr$",
    r"^fbc$",
    r"^sb$",
    r"^wd$",
    r"^xs$",
    r"^c_user$",
    r"^presence$",
    r"^act$",
    r"^m_pixel_ratio$",
    r"^spin$",
    r"^locale$",
    r"^datr$",
    // Chat / CRM widgets
    r"^hubspotutk$",
    r"^intercom",
    r"^tawk",
    r"^datadog",
    // Pinterest
    r"^_pin",
    r"^_pinterest",
    // Ad networks
    r"^_ads",
    r"^_ad",
    r"^_adroll",
    r"^_scid",
    // LinkedIn
    r"^li_at",
    r"^_li",
    r"^_linkedin",
    // Generic
    r"^tracking",
    r"^clickid",
    r"^affiliate",
];

/// Vendor fragments matched against a script `src`
const ANALYTICS_SCRIPT_SOURCES: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "googleapis.com/analytics",
    "analytics.google.com",
    "analytics.js",
    "gtag.js",
    "ga.js",
];

const MARKETING_SCRIPT_SOURCES: &[&str] = &[
    "facebook.com/tr",
    "facebook.net/connect",
    "facebook.com/connect",
    "facebook.net/js/sdk",
    "connect.facebook.net",
    "pixel.facebook.com",
    "fbevents.js",
    "facebook-analytics",
];

/// Call signatures searched for in lowercased inline script text
const ANALYTICS_INLINE_SIGNATURES: &[&str] =
    &["gtag(", "google-analytics", "analytics.js", "ga("];

const MARKETING_INLINE_SIGNATURES: &[&str] = &["fbq(", "facebook pixel", "_fbp", "fbevents.js"];

struct CookieTable {
    category: &'static str,
    patterns: Vec<Regex>,
}

impl CookieTable {
    fn compile(category: &'static str, sources: &[&str]) -> Self {
        let patterns = sources
            .iter()
            .filter_map(|source| match Regex::new(source) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!(pattern = %source, error = %e, "Skipping invalid cookie pattern");
                    None
                }
            })
            .collect();

        Self { category, patterns }
    }

    fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }
}

static COOKIE_TABLES: LazyLock<[CookieTable; 2]> = LazyLock::new(|| {
    [
        CookieTable::compile(CategoryId::ANALYTICS, ANALYTICS_COOKIES),
        CookieTable::compile(CategoryId::MARKETING, MARKETING_COOKIES),
    ]
});

const SCRIPT_SOURCE_TABLES: [(&str, &[&str]); 2] = [
    (CategoryId::ANALYTICS, ANALYTICS_SCRIPT_SOURCES),
    (CategoryId::MARKETING, MARKETING_SCRIPT_SOURCES),
];

const SCRIPT_INLINE_TABLES: [(&str, &[&str]); 2] = [
    (CategoryId::ANALYTICS, ANALYTICS_INLINE_SIGNATURES),
    (CategoryId::MARKETING, MARKETING_INLINE_SIGNATURES),
];

/// What is known about a script when deciding whether it may run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    pub url: Option<String>,
    pub inline_text: Option<String>,
}

impl ScriptDescriptor {
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            inline_text: None,
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            url: None,
            inline_text: Some(text.into()),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> String {
        match (&self.url, &self.inline_text) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(text)) => {
                let snippet: String = text.trim().chars().take(40).collect();
                format!("inline:{}", snippet)
            }
            _ => "inline:".to_string(),
        }
    }
}

/// Stateless classifier over the built-in heuristic tables
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a cookie by name
    pub fn classify_cookie_name(&self, name: &str) -> Option<CategoryId> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        COOKIE_TABLES
            .iter()
            .find(|table| table.matches(name))
            .map(|table| CategoryId::new(table.category))
    }

    /// Classify a script by `src`, falling back to its inline text
    pub fn classify_script(&self, script: &ScriptDescriptor) -> Option<CategoryId> {
        if let Some(url) = script.url.as_deref().filter(|u| !u.is_empty()) {
            let url = url.to_lowercase();
            return SCRIPT_SOURCE_TABLES
                .iter()
                .find(|(_, fragments)| fragments.iter().any(|f| url.contains(f)))
                .map(|(category, _)| CategoryId::new(*category));
        }

        let text = script.inline_text.as_deref()?.to_lowercase();
        if text.is_empty() {
            return None;
        }

        SCRIPT_INLINE_TABLES
            .iter()
            .find(|(_, signatures)| signatures.iter().any(|s| text.contains(s)))
            .map(|(category, _)| CategoryId::new(*category))
    }

    pub fn is_tracking_cookie(&self, name: &str) -> bool {
        self.classify_cookie_name(name).is_some()
    }

    pub fn is_tracking_script(&self, script: &ScriptDescriptor) -> bool {
        self.classify_script(script).is_some()
    }
}

/// Classify a cookie name with the built-in tables
pub fn classify_cookie_name(name: &str) -> Option<CategoryId> {
    Classifier.classify_cookie_name(name)
}

/// Classify a script with the built-in tables
pub fn classify_script(script: &ScriptDescriptor) -> Option<CategoryId> {
    Classifier.classify_script(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytics_cookies() {
        for name in ["_ga", "_ga_ABC123", "_gid", "_gat_gtag_UA_1", "__utma", "_gcl_au"] {
            assert_eq!(
                classify_cookie_name(name),
                Some(CategoryId::analytics()),
                "{} should be analytics",
                name
            );
        }
    }

    #[test]
    fn test_marketing_cookies() {
        for name in ["_fbp", "fr", "hubspotutk", "intercom-session-x", "_pin_unauth", "li_at"] {
            assert_eq!(
                classify_cookie_name(name),
                Some(CategoryId::marketing()),
                "{} should be marketing",
                name
            );
        }
    }

    #[test]
    fn test_unclassified_cookies() {
        assert_eq!(classify_cookie_name("PHPSESSID"), None);
        assert_eq!(classify_cookie_name("cc_cookie"), None);
        assert_eq!(classify_cookie_name(""), None);
        // Anchored: only prefixes count
        assert_eq!(classify_cookie_name("my_ga"), None);
        // Exact-match entries don't match longer names
        assert_eq!(classify_cookie_name("french"), None);
    }

    #[test]
    fn test_classifier_helpers() {
        let classifier = Classifier::new();
        assert!(classifier.is_tracking_cookie("  _gid "));
        assert!(!classifier.is_tracking_cookie("wordpress_logged_in"));
        assert!(classifier.is_tracking_script(&ScriptDescriptor::inline("fbq('track')")));
    }

    #[test]
    fn test_script_by_url() {
        let gtm = ScriptDescriptor::external("https://www.googletagmanager.com/gtag/js?id=G-1");
        assert_eq!(classify_script(&gtm), Some(CategoryId::analytics()));

        let pixel = ScriptDescriptor::external("https://connect.facebook.net/en_US/fbevents.js");
        assert_eq!(classify_script(&pixel), Some(CategoryId::marketing()));

        let upper = ScriptDescriptor::external("HTTPS://WWW.GOOGLE-ANALYTICS.COM/analytics.js");
        assert_eq!(classify_script(&upper), Some(CategoryId::analytics()));

        let jquery = ScriptDescriptor::external("https://code.jquery.com/jquery.min.js");
        assert_eq!(classify_script(&jquery), None);
    }

    #[test]
    fn test_url_takes_precedence_over_inline_text() {
        let script = ScriptDescriptor {
            url: Some("https://cdn.example.com/app.js".to_string()),
            inline_text: Some("gtag('config')".to_string()),
        };
        assert_eq!(classify_script(&script), None);
    }

    #[test]
    fn test_script_by_inline_text() {
        let gtag = ScriptDescriptor::inline("window.dataLayer=[];function x(){} GTAG('js', new Date());");
        assert_eq!(classify_script(&gtag), Some(CategoryId::analytics()));

        let fbq = ScriptDescriptor::inline("!function(f){}; fbq('init', '123');");
        assert_eq!(classify_script(&fbq), Some(CategoryId::marketing()));

        let app = ScriptDescriptor::inline("console.log('hello');");
        assert_eq!(classify_script(&app), None);

        assert_eq!(classify_script(&ScriptDescriptor::default()), None);
    }

    #[test]
    fn test_descriptor_label() {
        assert_eq!(ScriptDescriptor::external("https://a.com/x.js").label(), "https://a.com/x.js");
        assert_eq!(ScriptDescriptor::inline("  fbq('init')  ").label(), "inline:fbq('init')");
    }
}
