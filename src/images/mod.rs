//! Remote image allowlist.
//!
//! A remote pattern names a protocol, hostname, optional port, path glob and
//! optional search string. An image URL is admitted when any pattern matches
//! it, or when its hostname appears in the legacy `domains` list.

mod glob;

use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use globset::GlobMatcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// One entry of the remote image allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    pub hostname: String,
    /// `Some("")` admits only URLs without an explicit port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Path glob; absent means any path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,
    /// Exact query string including the leading `?`; `Some("")` means no query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl fmt::Display for RemotePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Some(protocol) => write!(f, "{}://", protocol.as_str())?,
            None => f.write_str("*://")?,
        }
        f.write_str(&self.hostname)?;
        if let Some(port) = self.port.as_deref().filter(|p| !p.is_empty()) {
            write!(f, ":{port}")?;
        }
        f.write_str(self.pathname.as_deref().unwrap_or("/**"))?;
        if let Some(search) = &self.search {
            f.write_str(search)?;
        }
        Ok(())
    }
}

/// Allowlist configuration as stored in `images.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub remote_patterns: Vec<RemotePattern>,
    /// Hostnames admitted for any protocol and path.
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            remote_patterns: vec![RemotePattern {
                protocol: Some(Protocol::Https),
                hostname: "content.airhex.com".to_owned(),
                port: None,
                pathname: Some("/content/logos/**".to_owned()),
                search: None,
            }],
            domains: Vec::new(),
        }
    }
}

impl ImageConfig {
    /// Load the allowlist from a TOML file layered over the built-in default.
    ///
    /// A missing file leaves the default in place.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(ImageConfig::default()))
            .merge(Toml::file(path))
            .extract()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("remote pattern #{index} has an empty hostname")]
    EmptyHostname { index: usize },
    #[error("remote pattern #{index} has an invalid {field} glob {glob:?}")]
    InvalidGlob {
        index: usize,
        field: &'static str,
        glob: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ImageCheckError {
    #[error("invalid image URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug)]
struct CompiledPattern {
    pattern: RemotePattern,
    hostname: GlobMatcher,
    pathname: GlobMatcher,
}

impl CompiledPattern {
    fn new(index: usize, pattern: &RemotePattern) -> Result<Self, PatternError> {
        if pattern.hostname.trim().is_empty() {
            return Err(PatternError::EmptyHostname { index });
        }

        let hostname =
            glob::hostname(&pattern.hostname).map_err(|source| PatternError::InvalidGlob {
                index,
                field: "hostname",
                glob: pattern.hostname.clone(),
                source,
            })?;

        let raw_pathname = pattern.pathname.as_deref().unwrap_or("**");
        let pathname =
            glob::pathname(raw_pathname).map_err(|source| PatternError::InvalidGlob {
                index,
                field: "pathname",
                glob: raw_pathname.to_owned(),
                source,
            })?;

        Ok(Self {
            pattern: pattern.clone(),
            hostname,
            pathname,
        })
    }

    fn matches(&self, url: &Url) -> bool {
        if self
            .pattern
            .protocol
            .is_some_and(|protocol| protocol.as_str() != url.scheme())
        {
            return false;
        }

        if let Some(port) = &self.pattern.port {
            let actual = url.port().map(|p| p.to_string()).unwrap_or_default();
            if *port != actual {
                return false;
            }
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        if !self.hostname.is_match(glob::labels_as_segments(host)) {
            return false;
        }

        if let Some(search) = &self.pattern.search {
            let actual = url.query().map(|q| format!("?{q}")).unwrap_or_default();
            if *search != actual {
                return false;
            }
        }

        self.pathname.is_match(url.path())
    }
}

/// Compiled form of an [`ImageConfig`].
#[derive(Debug)]
pub struct ImageAllowlist {
    patterns: Vec<CompiledPattern>,
    domains: Vec<String>,
}

/// Why a URL was admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<'a> {
    Pattern(&'a RemotePattern),
    Domain(&'a str),
}

impl fmt::Display for Admission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::Pattern(pattern) => write!(f, "pattern {pattern}"),
            Admission::Domain(domain) => write!(f, "domain {domain}"),
        }
    }
}

impl ImageAllowlist {
    pub fn new(config: &ImageConfig) -> Result<Self, PatternError> {
        let patterns = config
            .remote_patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| CompiledPattern::new(index, pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let domains = config
            .domains
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        debug!(
            remote_patterns = patterns.len(),
            "image allowlist compiled"
        );

        Ok(Self { patterns, domains })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &RemotePattern> {
        self.patterns.iter().map(|p| &p.pattern)
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// First pattern matching `url`, if any.
    pub fn matching_pattern(&self, url: &Url) -> Option<&RemotePattern> {
        self.patterns
            .iter()
            .find(|p| p.matches(url))
            .map(|p| &p.pattern)
    }

    /// Reason `url` is admitted, or `None` when it is rejected.
    pub fn admission(&self, url: &Url) -> Option<Admission<'_>> {
        if let Some(pattern) = self.matching_pattern(url) {
            return Some(Admission::Pattern(pattern));
        }

        let host = url.host_str()?;
        let domain = self.domains.iter().find(|d| d.as_str() == host)?;
        Some(Admission::Domain(domain.as_str()))
    }

    /// Parse `raw` and return why it is admitted, or `None` when it is rejected.
    pub fn admit(&self, raw: &str) -> Result<Option<Admission<'_>>, ImageCheckError> {
        let url = Url::parse(raw).map_err(|source| ImageCheckError::InvalidUrl {
            url: raw.to_owned(),
            source,
        })?;
        let admission = self.admission(&url);
        trace!(url = %url, allowed = admission.is_some(), "image allowlist lookup");
        Ok(admission)
    }

    /// Parse `raw` and report whether it is admitted.
    pub fn check(&self, raw: &str) -> Result<bool, ImageCheckError> {
        Ok(self.admit(raw)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_allowlist() -> ImageAllowlist {
        ImageAllowlist::new(&ImageConfig::default()).unwrap()
    }

    fn pattern(hostname: &str) -> RemotePattern {
        RemotePattern {
            protocol: None,
            hostname: hostname.to_owned(),
            port: None,
            pathname: None,
            search: None,
        }
    }

    #[test]
    fn default_admits_airhex_logos() {
        let allowlist = default_allowlist();
        assert!(
            allowlist
                .check("https://content.airhex.com/content/logos/airlines_AA_200_200_s.png")
                .unwrap()
        );
        assert!(
            allowlist
                .check("https://content.airhex.com/content/logos/airlines_LH_350_100_r.png?proportions=keep")
                .unwrap()
        );
    }

    #[test]
    fn default_rejects_other_hosts_protocols_and_paths() {
        let allowlist = default_allowlist();
        for url in [
            "http://content.airhex.com/content/logos/a.png",
            "https://images.example.com/content/logos/a.png",
            "https://cdn.content.airhex.com/content/logos/a.png",
            "https://content.airhex.com/content/other/a.png",
            "ftp://content.airhex.com/content/logos/a.png",
        ] {
            assert!(!allowlist.check(url).unwrap(), "{url} should be rejected");
        }
    }

    #[test]
    fn explicit_default_port_is_normalized_away() {
        let allowlist = default_allowlist();
        assert!(
            allowlist
                .check("https://content.airhex.com:443/content/logos/a.png")
                .unwrap()
        );
    }

    #[test]
    fn port_and_search_must_match_exactly() {
        let config = ImageConfig {
            remote_patterns: vec![RemotePattern {
                port: Some("8080".to_owned()),
                search: Some("?v=2".to_owned()),
                ..pattern("localhost")
            }],
            domains: Vec::new(),
        };
        let allowlist = ImageAllowlist::new(&config).unwrap();

        assert!(allowlist.check("http://localhost:8080/a.png?v=2").unwrap());
        assert!(!allowlist.check("http://localhost:8080/a.png?v=3").unwrap());
        assert!(!allowlist.check("http://localhost:8080/a.png").unwrap());
        assert!(!allowlist.check("http://localhost/a.png?v=2").unwrap());
    }

    #[test]
    fn empty_search_requires_no_query() {
        let config = ImageConfig {
            remote_patterns: vec![RemotePattern {
                search: Some(String::new()),
                ..pattern("img.example.com")
            }],
            domains: Vec::new(),
        };
        let allowlist = ImageAllowlist::new(&config).unwrap();

        assert!(allowlist.check("https://img.example.com/a.png").unwrap());
        assert!(!allowlist.check("https://img.example.com/a.png?x=1").unwrap());
    }

    #[test]
    fn hostname_pattern_is_case_insensitive() {
        let allowlist = ImageAllowlist::new(&ImageConfig {
            remote_patterns: vec![pattern("CDN.Example.com")],
            domains: Vec::new(),
        })
        .unwrap();
        assert!(allowlist.check("https://cdn.EXAMPLE.com/x.png").unwrap());
    }

    #[test]
    fn domains_admit_any_path_and_protocol() {
        let allowlist = ImageAllowlist::new(&ImageConfig {
            remote_patterns: Vec::new(),
            domains: vec!["Images.Example.com".to_owned()],
        })
        .unwrap();

        let url = Url::parse("http://images.example.com/deep/path/x.png").unwrap();
        assert_eq!(
            allowlist.admission(&url),
            Some(Admission::Domain("images.example.com"))
        );
        assert!(!allowlist.check("https://sub.images.example.com/x.png").unwrap());
    }

    #[test]
    fn first_matching_pattern_is_reported() {
        let config = ImageConfig {
            remote_patterns: vec![pattern("a.example.com"), pattern("*.example.com")],
            domains: Vec::new(),
        };
        let allowlist = ImageAllowlist::new(&config).unwrap();

        let url = Url::parse("https://b.example.com/x").unwrap();
        assert_eq!(
            allowlist.matching_pattern(&url).map(|p| p.hostname.as_str()),
            Some("*.example.com")
        );
    }

    #[test]
    fn empty_hostname_is_rejected() {
        let config = ImageConfig {
            remote_patterns: vec![pattern("ok.example.com"), pattern("  ")],
            domains: Vec::new(),
        };
        assert!(matches!(
            ImageAllowlist::new(&config),
            Err(PatternError::EmptyHostname { index: 1 })
        ));
    }

    #[test]
    fn invalid_pathname_glob_is_rejected() {
        let config = ImageConfig {
            remote_patterns: vec![RemotePattern {
                pathname: Some("/logos/[a.png".to_owned()),
                ..pattern("img.example.com")
            }],
            domains: Vec::new(),
        };
        assert!(matches!(
            ImageAllowlist::new(&config),
            Err(PatternError::InvalidGlob {
                index: 0,
                field: "pathname",
                ..
            })
        ));
    }

    #[test]
    fn admit_reports_the_matching_pattern() {
        let allowlist = default_allowlist();
        let admission = allowlist
            .admit("https://content.airhex.com/content/logos/airlines_KL_100_100_s.png")
            .unwrap()
            .expect("airhex logo is admitted");
        assert_eq!(
            admission.to_string(),
            "pattern https://content.airhex.com/content/logos/**"
        );
        assert_eq!(allowlist.admit("https://example.com/a.png").unwrap(), None);
    }

    #[test]
    fn unparsable_url_is_an_error() {
        assert!(matches!(
            default_allowlist().check("content/logos/a.png"),
            Err(ImageCheckError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn display_renders_pattern_as_url() {
        let default = ImageConfig::default();
        assert_eq!(
            default.remote_patterns[0].to_string(),
            "https://content.airhex.com/content/logos/**"
        );
        let any = RemotePattern {
            port: Some("8080".to_owned()),
            ..pattern("**.example.com")
        };
        assert_eq!(any.to_string(), "*://**.example.com:8080/**");
    }
}
