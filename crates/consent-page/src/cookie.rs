//! Cookie store
//!
//! Models the parts of RFC 6265 the consent engine depends on: a cookie is
//! identified by name + domain + host-only flag + path, and only an exact
//! match on all four can overwrite or delete it. None of that identity is
//! visible through the `document.cookie` read view.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed `document.cookie = "..."` assignment or `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAssignment {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub same_site: Option<String>,
    pub secure: bool,
}

impl CookieAssignment {
    /// Parse an assignment string. Unknown or malformed attributes are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let pair = parts.next().unwrap_or("");

        let (name, value) = match pair.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => ("", pair.trim()),
        };

        let mut assignment = Self {
            name: name.to_string(),
            value: value.to_string(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            same_site: None,
            secure: false,
        };

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };

            match key.to_ascii_lowercase().as_str() {
                "path" => assignment.path = Some(val.to_string()),
                "domain" => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if !domain.is_empty() {
                        assignment.domain = Some(domain);
                    }
                }
                "expires" => assignment.expires = parse_cookie_date(val),
                "max-age" => assignment.max_age = val.parse().ok(),
                "samesite" => assignment.same_site = Some(val.to_string()),
                "secure" => assignment.secure = true,
                _ => {}
            }
        }

        assignment
    }

    /// Cookie name of an assignment string, without parsing attributes
    pub fn name_of(raw: &str) -> &str {
        let pair = raw.split(';').next().unwrap_or("");
        match pair.split_once('=') {
            Some((name, _)) => name.trim(),
            None => "",
        }
    }

    /// Expiry time, Max-Age taking precedence over Expires
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.max_age {
            Some(seconds) => Duration::try_seconds(seconds).and_then(|d| now.checked_add_signed(d)),
            None => self.expires,
        }
    }

    /// Whether this assignment removes rather than sets a cookie
    pub fn is_deletion(&self, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(seconds) => seconds <= 0,
            None => self.expires.is_some_and(|at| at <= now),
        }
    }
}

/// Accepts `toUTCString()` output plus the dashed Netscape variant
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = match raw.strip_suffix(" UTC") {
        Some(rest) => format!("{} GMT", rest),
        None => raw.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d %b %Y %H:%M:%S GMT"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without leading dot
    pub domain: String,
    /// Set without a Domain attribute: only sent to the exact host
    pub host_only: bool,
    pub path: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub same_site: Option<String>,
    pub secure: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredCookie {
    fn same_identity(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.domain == other.domain
            && self.host_only == other.host_only
            && self.path == other.path
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn visible_to(&self, host: &str, path: &str) -> bool {
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(host, &self.domain)
        };

        domain_ok && path_matches(path, &self.path)
    }
}

/// Outcome of applying an assignment to the jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Stored,
    Replaced,
    Deleted,
    /// Deletion that matched no stored cookie
    NoMatch,
    /// Rejected by the store (bad domain, empty assignment)
    Rejected(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an assignment made by a page at `host` + `page_path`
    pub fn apply(
        &mut self,
        assignment: &CookieAssignment,
        host: &str,
        page_path: &str,
        now: DateTime<Utc>,
    ) -> CookieChange {
        if assignment.name.is_empty() && assignment.value.is_empty() {
            return CookieChange::Rejected("empty assignment");
        }

        let host = host.to_ascii_lowercase();
        let (domain, host_only) = match &assignment.domain {
            Some(domain) => {
                if !domain_matches(&host, domain) {
                    return CookieChange::Rejected("domain does not match host");
                }
                (domain.clone(), false)
            }
            None => (host.clone(), true),
        };

        let path = match assignment.path.as_deref() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(page_path),
        };

        let candidate = StoredCookie {
            name: assignment.name.clone(),
            value: assignment.value.clone(),
            domain,
            host_only,
            path,
            expires_at: assignment.expiry(now),
            same_site: assignment.same_site.clone(),
            secure: assignment.secure,
            created_at: now,
        };

        let existing = self.cookies.iter().position(|c| c.same_identity(&candidate));

        if assignment.is_deletion(now) {
            return match existing {
                Some(index) => {
                    self.cookies.remove(index);
                    CookieChange::Deleted
                }
                None => CookieChange::NoMatch,
            };
        }

        match existing {
            Some(index) => {
                let created_at = self.cookies[index].created_at;
                self.cookies[index] = StoredCookie {
                    created_at,
                    ..candidate
                };
                CookieChange::Replaced
            }
            None => {
                self.cookies.push(candidate);
                CookieChange::Stored
            }
        }
    }

    /// `document.cookie` read view for a page at `host` + `path`
    pub fn header_string(&self, host: &str, path: &str, now: DateTime<Utc>) -> String {
        self.visible(host, path, now)
            .map(|c| {
                if c.name.is_empty() {
                    c.value.clone()
                } else {
                    format!("{}={}", c.name, c.value)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn visible<'a>(
        &'a self,
        host: &'a str,
        path: &'a str,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a StoredCookie> + 'a {
        self.cookies
            .iter()
            .filter(move |c| !c.is_expired(now) && c.visible_to(host, path))
    }

    /// Every stored cookie, including ones not visible from the current page
    pub fn all(&self) -> &[StoredCookie] {
        &self.cookies
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.cookies.retain(|c| !c.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }

    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

/// RFC 6265 §5.1.4 default-path
fn default_path(page_path: &str) -> String {
    if !page_path.starts_with('/') {
        return "/".to_string();
    }

    match page_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => page_path[..index].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "www.example.com";

    fn apply(jar: &mut CookieJar, raw: &str) -> CookieChange {
        jar.apply(&CookieAssignment::parse(raw), HOST, "/blog/post", Utc::now())
    }

    fn view(jar: &CookieJar) -> String {
        jar.header_string(HOST, "/blog/post", Utc::now())
    }

    #[test]
    fn test_parse_assignment() {
        let a = CookieAssignment::parse(
            "_ga=GA1.2.123; Path=/; domain=.Example.com; SameSite=Lax; max-age=60; Secure",
        );
        assert_eq!(a.name, "_ga");
        assert_eq!(a.value, "GA1.2.123");
        assert_eq!(a.path.as_deref(), Some("/"));
        assert_eq!(a.domain.as_deref(), Some("example.com"));
        assert_eq!(a.max_age, Some(60));
        assert_eq!(a.same_site.as_deref(), Some("Lax"));
        assert!(a.secure);

        assert_eq!(CookieAssignment::name_of(" _fbp =xyz; path=/"), "_fbp");
        assert_eq!(CookieAssignment::name_of("novalue"), "");
    }

    #[test]
    fn test_parse_expiry_formats() {
        let now = Utc::now();
        for raw in [
            "a=; expires=Thu, 01 Jan 1970 00:00:00 GMT",
            "a=; expires=Thu, 01 Jan 1970 00:00:00 UTC",
            "a=; expires=Thu, 01-Jan-1970 00:00:00 GMT",
            "a=; max-age=0",
        ] {
            assert!(CookieAssignment::parse(raw).is_deletion(now), "{}", raw);
        }

        assert!(!CookieAssignment::parse("a=1; max-age=10").is_deletion(now));
        assert!(!CookieAssignment::parse("a=1").is_deletion(now));
    }

    #[test]
    fn test_set_and_read() {
        let mut jar = CookieJar::new();
        assert_eq!(apply(&mut jar, "a=1; path=/"), CookieChange::Stored);
        assert_eq!(apply(&mut jar, "b=2; path=/"), CookieChange::Stored);
        assert_eq!(apply(&mut jar, "a=3; path=/"), CookieChange::Replaced);
        assert_eq!(view(&jar), "a=3; b=2");
    }

    #[test]
    fn test_default_path() {
        assert_eq!(default_path("/blog/post"), "/blog");
        assert_eq!(default_path("/post"), "/");
        assert_eq!(default_path(""), "/");

        let mut jar = CookieJar::new();
        apply(&mut jar, "a=1");
        assert_eq!(jar.all()[0].path, "/blog");
        // Not visible from the site root
        assert_eq!(jar.header_string(HOST, "/", Utc::now()), "");
    }

    #[test]
    fn test_deletion_requires_exact_identity() {
        let mut jar = CookieJar::new();
        apply(&mut jar, "_ga=1; path=/; domain=example.com");

        // Host-only deletion doesn't touch the domain cookie
        assert_eq!(
            apply(&mut jar, "_ga=; path=/; expires=Thu, 01 Jan 1970 00:00:00 GMT"),
            CookieChange::NoMatch
        );
        assert_eq!(view(&jar), "_ga=1");

        assert_eq!(
            apply(&mut jar, "_ga=; path=/; domain=.example.com; max-age=0"),
            CookieChange::Deleted
        );
        assert_eq!(view(&jar), "");
    }

    #[test]
    fn test_foreign_domain_rejected() {
        let mut jar = CookieJar::new();
        assert!(matches!(
            apply(&mut jar, "a=1; domain=other.com"),
            CookieChange::Rejected(_)
        ));
        assert!(matches!(
            apply(&mut jar, "a=1; domain=ample.com"),
            CookieChange::Rejected(_)
        ));
        assert!(jar.is_empty());
    }

    #[test]
    fn test_expired_cookies_hidden() {
        let mut jar = CookieJar::new();
        let now = Utc::now();
        jar.apply(&CookieAssignment::parse("a=1; max-age=5; path=/"), HOST, "/", now);

        let later = now + Duration::seconds(10);
        assert_eq!(jar.header_string(HOST, "/", later), "");
        jar.purge_expired(later);
        assert!(jar.is_empty());
    }
}
