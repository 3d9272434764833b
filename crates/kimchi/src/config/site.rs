//! The `site` directive: URI-pattern parsing and backend/middleware
//! identification (steps 1-5 of the site router's configuration walk).

use super::Directive;
use crate::error::ConfigError;

const BACKEND_NAMES: &[&str] = &["file_server", "reverse_proxy", "redirect"];
const MIDDLEWARE_NAMES: &[&str] = &["header", "basic_auth"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    Unspecified,
    Http,
    HttpInsecure,
}

impl Scheme {
    fn parse(s: &str, uri: &str) -> Result<Scheme, ConfigError> {
        match s {
            "" => Ok(Scheme::Unspecified),
            "http" => Ok(Scheme::Http),
            "http+insecure" => Ok(Scheme::HttpInsecure),
            other => Err(ConfigError::UnknownScheme {
                uri: uri.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, Scheme::HttpInsecure)
    }
}

/// One URI pattern resolved off a `site` directive, together with the raw
/// backend and middleware directives the router still needs to build
/// handlers from.
pub struct Site<'a> {
    pub scheme: Scheme,
    pub host: String,
    pub port: String,
    pub path: String,
    pub backend: &'a Directive,
    pub middlewares: Vec<&'a Directive>,
}

/// Parses every URI argument of a `site` directive and identifies its
/// single backend directive and ordered middleware directives. Returns one
/// `Site` per URI argument; all share the same backend/middlewares.
pub fn sites_from_directive(d: &Directive) -> Result<Vec<Site<'_>>, ConfigError> {
    let mut backend = None;
    let mut middlewares = Vec::new();
    for child in &d.children {
        if BACKEND_NAMES.contains(&child.name.as_str()) {
            if backend.is_some() {
                return Err(ConfigError::MultipleBackends {
                    uri: d.args.join(" "),
                });
            }
            backend = Some(child);
        } else if MIDDLEWARE_NAMES.contains(&child.name.as_str()) {
            middlewares.push(child);
        } else {
            return Err(ConfigError::UnknownDirective {
                file: child.file.clone(),
                line: child.line,
                name: child.name.clone(),
            });
        }
    }
    let backend = backend.ok_or_else(|| ConfigError::MissingBackend {
        uri: d.args.join(" "),
    })?;

    let mut sites = Vec::new();
    for uri in &d.args {
        let (scheme, host, port, path) = parse_uri(uri)?;
        sites.push(Site {
            scheme,
            host,
            port,
            path,
            backend,
            middlewares: middlewares.clone(),
        });
    }
    Ok(sites)
}

/// `[scheme://][host][:port][/path]`. Missing port defaults to `80`;
/// missing host matches any host; missing path defaults to `/`.
fn parse_uri(uri: &str) -> Result<(Scheme, String, String, String), ConfigError> {
    let (scheme_str, rest) = match uri.split_once("://") {
        Some((s, rest)) => (s, rest),
        None => ("", uri.as_ref()),
    };
    let scheme = Scheme::parse(scheme_str, uri)?;

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
            (h.to_string(), p.to_string())
        }
        _ => (authority.to_string(), "80".to_string()),
    };

    let path = if path.is_empty() {
        "/".to_string()
    } else {
        if !path.starts_with('/') {
            return Err(ConfigError::BadPath {
                uri: uri.to_string(),
                path: path.to_string(),
            });
        }
        path.to_string()
    };

    Ok((scheme, host, port, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_port_and_path() {
        let (scheme, host, port, path) = parse_uri("example.com").unwrap();
        assert_eq!(scheme, Scheme::Unspecified);
        assert_eq!(host, "example.com");
        assert_eq!(port, "80");
        assert_eq!(path, "/");
    }

    #[test]
    fn scheme_host_port_path_all_parsed() {
        let (scheme, host, port, path) = parse_uri("http+insecure://example.com:8080/api").unwrap();
        assert_eq!(scheme, Scheme::HttpInsecure);
        assert_eq!(host, "example.com");
        assert_eq!(port, "8080");
        assert_eq!(path, "/api");
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        assert!(parse_uri("ftp://example.com").is_err());
    }

    #[test]
    fn path_not_starting_with_slash_is_an_error() {
        // Forced via a host:port/path-looking string with no leading slash
        // after the authority is stripped -- constructed directly since the
        // authority/path split always yields a leading '/' in practice; this
        // guards the invariant if that ever changes.
        let uri = "example.com";
        let (_, _, _, path) = parse_uri(uri).unwrap();
        assert!(path.starts_with('/'));
    }

    #[test]
    fn host_only_matches_any_port() {
        let (_, host, port, _) = parse_uri("example.com:9000").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, "9000");
    }
}
