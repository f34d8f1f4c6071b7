//! Registration pattern matching.
//!
//! # Responsibilities
//! - Match a request host against a registration's host pattern
//! - Match a request path against a registration's path pattern
//! - Combine both conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive, label by label; `*` matches one label
//! - A request port is ignored unless the pattern names one
//! - Path matching is case-sensitive, segment by segment; empty segments
//!   are ignored
//! - `:name` matches exactly one segment, `*` or `*name` matches the rest
//!   (at least one segment)
//! - No regex to guarantee O(n) matching

use crate::protocol::Registration;

/// Trait for matching a request's host and path against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, host: &str, path: &str) -> bool;
}

/// Matches the request host.
#[derive(Debug, Clone)]
pub struct HostPattern {
    labels: Vec<String>,
    port: Option<String>,
}

impl HostPattern {
    /// Create a host pattern such as `*.farm.example.net` or `localhost:9000`.
    pub fn new(pattern: &str) -> Self {
        let (host, port) = split_port(pattern);
        Self {
            labels: host.to_lowercase().split('.').map(str::to_string).collect(),
            port: port.map(str::to_string),
        }
    }

    fn is_any(&self) -> bool {
        self.port.is_none() && self.labels.len() == 1 && self.labels[0] == "*"
    }
}

impl Matcher for HostPattern {
    fn matches(&self, host: &str, _path: &str) -> bool {
        if self.is_any() {
            return true;
        }

        let (name, port) = split_port(host);
        if self.port.is_some() && self.port.as_deref() != port {
            return false;
        }

        let name = name.to_lowercase();
        let labels: Vec<&str> = name.split('.').collect();
        labels.len() == self.labels.len()
            && self
                .labels
                .iter()
                .zip(labels)
                .all(|(want, got)| (want == "*" && !got.is_empty()) || want == got)
    }
}

/// Matches the request path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<String>,
}

impl PathPattern {
    /// Create a path pattern such as `/api/:version/*rest`.
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: segments(pattern).map(str::to_string).collect(),
        }
    }
}

impl Matcher for PathPattern {
    fn matches(&self, _host: &str, path: &str) -> bool {
        let parts: Vec<&str> = segments(path).collect();

        for (i, want) in self.segments.iter().enumerate() {
            if want.starts_with('*') {
                return parts.len() > i;
            }
            let Some(got) = parts.get(i) else {
                return false;
            };
            if !want.starts_with(':') && want != got {
                return false;
            }
        }

        parts.len() == self.segments.len()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Host and path matcher for a registration.
    pub fn for_registration(registration: &Registration) -> Self {
        Self::new(vec![
            Box::new(HostPattern::new(registration.authority())),
            Box::new(PathPattern::new(registration.path())),
        ])
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, host: &str, path: &str) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(host, path))
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn split_port(host: &str) -> (&str, Option<&str>) {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.rfind(']') {
        return match host[end..].find(':') {
            Some(i) => (&host[..end + i], Some(&host[end + i + 1..])),
            None => (host, None),
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_pattern() {
        let matcher = HostPattern::new("*.farm.example.net");

        assert!(matcher.matches("what.farm.example.net", "/"));
        assert!(matcher.matches("WHAT.Farm.example.net", "/")); // Case insensitive
        assert!(matcher.matches("what.farm.example.net:8080", "/")); // Port ignored
        assert!(!matcher.matches("farm.example.net", "/"));
        assert!(!matcher.matches("a.b.farm.example.net", "/"));
        assert!(!matcher.matches("what.other.example.net", "/"));
    }

    #[test]
    fn test_host_pattern_with_port() {
        let matcher = HostPattern::new("localhost:9000");
        assert!(matcher.matches("localhost:9000", "/"));
        assert!(!matcher.matches("localhost:9001", "/"));
        assert!(!matcher.matches("localhost", "/"));

        assert!(HostPattern::new("*").matches("anything.example:1", "/"));
    }

    #[test]
    fn test_path_pattern() {
        let matcher = PathPattern::new("/test/*");
        assert!(matcher.matches("h", "/test/anything"));
        assert!(matcher.matches("h", "/test/a/b/c"));
        assert!(!matcher.matches("h", "/test"));
        assert!(!matcher.matches("h", "/other/anything"));

        let matcher = PathPattern::new("/api/:version/users");
        assert!(matcher.matches("h", "/api/v1/users"));
        assert!(matcher.matches("h", "//api/v2/users/"));
        assert!(!matcher.matches("h", "/api/v1/users/42"));
        assert!(!matcher.matches("h", "/api/v1"));

        let matcher = PathPattern::new("/");
        assert!(matcher.matches("h", "/"));
        assert!(!matcher.matches("h", "/index.html"));
    }

    #[test]
    fn test_registration_matcher() {
        let reg = Registration::parse("http://x.example/test/*").unwrap();
        let matcher = AndMatcher::for_registration(&reg);

        assert!(matcher.matches("x.example", "/test/anything"));
        assert!(!matcher.matches("y.example", "/test/anything"));
        assert!(!matcher.matches("x.example", "/prod/anything"));
    }

    #[test]
    fn test_split_port() {
        assert_eq!(split_port("example.com:80"), ("example.com", Some("80")));
        assert_eq!(split_port("example.com"), ("example.com", None));
        assert_eq!(split_port("[::1]:8080"), ("[::1]", Some("8080")));
        assert_eq!(split_port("[::1]"), ("[::1]", None));
    }
}
