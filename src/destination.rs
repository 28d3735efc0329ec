use std::fmt;

use url::{Host, Url};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme `{0}`, expected http or https")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("`{url}` does not target {destination}")]
    Foreign { url: String, destination: String },
}

/// Normalized scheme, host and port of a URL.
///
/// Two URLs that differ only in path, query, fragment or credentials map to the
/// same `Destination`, which is what lets one cached client serve every request
/// to a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    scheme: String,
    host: String,
    port: u16,
    root: Url,
}

impl Destination {
    pub fn parse(input: &str) -> Result<Self, DestinationError> {
        let url = Url::parse(input.trim())?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, DestinationError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(DestinationError::UnsupportedScheme(scheme.to_string()));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_ascii_lowercase(),
            Some(Host::Domain(_)) | None => return Err(DestinationError::MissingHost),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => format!("[{addr}]"),
        };

        let port = url
            .port()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });

        let root = Url::parse(&format!("{scheme}://{host}:{port}/"))?;

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
            root,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the destination, e.g. `https://example.com/`.
    pub fn as_url(&self) -> &Url {
        &self.root
    }

    /// Resolves `reference` against this destination.
    ///
    /// Relative references (`/users?page=2`, `users`) are joined onto the root.
    /// Whatever the form of `reference`, the resulting URL must normalize to
    /// this destination; scheme-relative references such as `//other.host/x`
    /// are rejected like absolute ones.
    pub fn join(&self, reference: &str) -> Result<Url, DestinationError> {
        let reference = reference.trim();
        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.as_url().join(reference)?,
            Err(err) => return Err(err.into()),
        };

        if Self::from_url(&url).as_ref() == Ok(self) {
            Ok(url)
        } else {
            Err(DestinationError::Foreign {
                url: reference.to_string(),
                destination: self.to_string(),
            })
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_paths_and_queries() {
        let a = Destination::parse("https://example.com/a").unwrap();
        let b = Destination::parse("https://example.com/b?x=1#frag").unwrap();
        let c = Destination::parse("https://user:pw@EXAMPLE.com:443").unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_string(), "https://example.com:443");
    }

    #[test]
    fn distinguishes_scheme_host_and_port() {
        let https = Destination::parse("https://example.com").unwrap();
        let http = Destination::parse("http://example.com").unwrap();
        let other = Destination::parse("https://other.com").unwrap();
        let custom_port = Destination::parse("https://example.com:8443").unwrap();

        assert_ne!(https, http);
        assert_ne!(https, other);
        assert_ne!(https, custom_port);
        assert_eq!(http.port(), 80);
        assert_eq!(custom_port.port(), 8443);
    }

    #[test]
    fn keeps_ipv6_brackets() {
        let dest = Destination::parse("http://[::1]:8080/health").unwrap();
        assert_eq!(dest.host(), "[::1]");
        assert_eq!(dest.to_string(), "http://[::1]:8080");
        assert_eq!(dest.as_url().as_str(), "http://[::1]:8080/");
    }

    #[test]
    fn rejects_unusable_destinations() {
        assert!(matches!(
            Destination::parse("not a url"),
            Err(DestinationError::Parse(_))
        ));
        assert_eq!(
            Destination::parse("ftp://example.com"),
            Err(DestinationError::UnsupportedScheme("ftp".to_string()))
        );
        assert!(Destination::parse("").is_err());
    }

    #[test]
    fn joins_relative_and_same_destination_urls() {
        let dest = Destination::parse("https://example.com").unwrap();

        assert_eq!(
            dest.join("/v1/users?page=2").unwrap().as_str(),
            "https://example.com/v1/users?page=2"
        );
        assert_eq!(
            dest.join("https://example.com:443/x").unwrap().as_str(),
            "https://example.com/x"
        );

        let err = dest.join("https://other.com/x").unwrap_err();
        match err {
            DestinationError::Foreign { destination, .. } => {
                assert_eq!(destination, "https://example.com:443")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_scheme_relative_references_to_other_hosts() {
        let dest = Destination::parse("https://api.example.com").unwrap();

        for reference in ["//evil.test/steal", "/\\evil.test/steal", "\\\\evil.test"] {
            match dest.join(reference).unwrap_err() {
                DestinationError::Foreign { url, .. } => assert_eq!(url, reference),
                other => panic!("unexpected error for {reference}: {other:?}"),
            }
        }

        assert_eq!(
            dest.join("//api.example.com/ok").unwrap().as_str(),
            "https://api.example.com/ok"
        );
    }
}
