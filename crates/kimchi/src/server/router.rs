//! Site Router: walks the parsed directive tree, building backend and
//! middleware handlers and registering each site's composed handler on the
//! owning listener's mux.

use std::sync::Arc;

use http::{HeaderName, HeaderValue};

use super::registry::ServerRegistry;
use crate::backend::{FileServer, Redirect, ReverseProxy};
use crate::config::site::{sites_from_directive, Site};
use crate::config::Directive;
use crate::error::ConfigError;
use crate::middleware::basic_auth::BasicAuth;
use crate::middleware::header::HeaderMiddleware;
use crate::middleware::{compose, Handler, MiddlewareFn};

/// Registers every `site` directive (top-level, post-import) onto the
/// registry's listeners.
pub fn build(registry: &ServerRegistry, top_level: &[Directive]) -> Result<(), ConfigError> {
    for d in top_level {
        if d.name != "site" {
            return Err(ConfigError::UnknownDirective {
                file: d.file.clone(),
                line: d.line,
                name: d.name.clone(),
            });
        }
        for site in sites_from_directive(d)? {
            register_site(registry, site)?;
        }
    }
    Ok(())
}

fn register_site(registry: &ServerRegistry, site: Site<'_>) -> Result<(), ConfigError> {
    let listener = registry.add_listener("tcp", &format!("0.0.0.0:{}", site.port));
    if site.scheme.is_insecure() {
        listener.set_insecure();
    }

    let backend = build_backend(site.backend)?;
    let middlewares = site
        .middlewares
        .iter()
        .copied()
        .map(build_middleware)
        .collect::<Result<Vec<MiddlewareFn>, ConfigError>>()?;
    let handler = compose(backend, middlewares);

    listener.register(&site.host, &site.path, handler);
    Ok(())
}

fn build_backend(d: &Directive) -> Result<Arc<dyn Handler>, ConfigError> {
    match d.name.as_str() {
        "file_server" => {
            let dir = d.args.first().ok_or_else(|| ConfigError::ArgCount {
                file: d.file.clone(),
                line: d.line,
                directive: "file_server".to_string(),
                want: "1".to_string(),
                got: 0,
            })?;
            let browse = d.children.iter().any(|c| c.name == "browse");
            Ok(Arc::new(FileServer::new(dir, browse)))
        }
        "reverse_proxy" => {
            let url = d.args.first().ok_or_else(|| ConfigError::ArgCount {
                file: d.file.clone(),
                line: d.line,
                directive: "reverse_proxy".to_string(),
                want: "1".to_string(),
                got: 0,
            })?;
            let parsed = url::Url::parse(url).map_err(|e| ConfigError::InvalidArg {
                directive: "reverse_proxy".to_string(),
                arg: url.clone(),
                reason: e.to_string(),
            })?;
            let proxy = ReverseProxy::new(&parsed).map_err(|reason| ConfigError::InvalidArg {
                directive: "reverse_proxy".to_string(),
                arg: url.clone(),
                reason,
            })?;
            Ok(Arc::new(proxy))
        }
        "redirect" => {
            let target = d.args.first().ok_or_else(|| ConfigError::ArgCount {
                file: d.file.clone(),
                line: d.line,
                directive: "redirect".to_string(),
                want: "1".to_string(),
                got: 0,
            })?;
            Ok(Arc::new(Redirect::new(target.clone())))
        }
        other => Err(ConfigError::UnknownDirective {
            file: d.file.clone(),
            line: d.line,
            name: other.to_string(),
        }),
    }
}

fn build_middleware(d: &Directive) -> Result<MiddlewareFn, ConfigError> {
    match d.name.as_str() {
        "header" => {
            let headers = header_pairs(d)?;
            Ok(Box::new(move |inner| {
                Arc::new(HeaderMiddleware::new(inner, headers.clone())) as Arc<dyn Handler>
            }) as MiddlewareFn)
        }
        "basic_auth" => {
            if d.args.len() != 2 {
                return Err(ConfigError::ArgCount {
                    file: d.file.clone(),
                    line: d.line,
                    directive: "basic_auth".to_string(),
                    want: "2".to_string(),
                    got: d.args.len(),
                });
            }
            let user = d.args[0].clone();
            let pass = d.args[1].clone();
            Ok(Box::new(move |inner| {
                Arc::new(BasicAuth::new(inner, user.clone(), pass.clone())) as Arc<dyn Handler>
            }) as MiddlewareFn)
        }
        other => Err(ConfigError::UnknownDirective {
            file: d.file.clone(),
            line: d.line,
            name: other.to_string(),
        }),
    }
}

fn header_pairs(d: &Directive) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
    let mut pairs = Vec::new();
    if d.children.is_empty() {
        if d.args.len() != 2 {
            return Err(ConfigError::ArgCount {
                file: d.file.clone(),
                line: d.line,
                directive: "header".to_string(),
                want: "2 (or zero, with child directives)".to_string(),
                got: d.args.len(),
            });
        }
        pairs.push(parse_header_pair(d, &d.args[0], &d.args[1])?);
    } else {
        let mut seen = std::collections::HashSet::new();
        for child in &d.children {
            if child.args.len() != 1 {
                return Err(ConfigError::ArgCount {
                    file: child.file.clone(),
                    line: child.line,
                    directive: child.name.clone(),
                    want: "1".to_string(),
                    got: child.args.len(),
                });
            }
            if !seen.insert(child.name.clone()) {
                return Err(ConfigError::DuplicateHeaderName(child.name.clone()));
            }
            pairs.push(parse_header_pair(child, &child.name, &child.args[0])?);
        }
    }
    Ok(pairs)
}

fn parse_header_pair(
    d: &Directive,
    name: &str,
    value: &str,
) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let name = HeaderName::try_from(name).map_err(|e| ConfigError::InvalidArg {
        directive: d.name.clone(),
        arg: name.to_string(),
        reason: e.to_string(),
    })?;
    let value = HeaderValue::try_from(value).map_err(|e| ConfigError::InvalidArg {
        directive: d.name.clone(),
        arg: value.to_string(),
        reason: e.to_string(),
    })?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    /// spec invariant: after startup, a listener's mux contains exactly one
    /// pattern per site registered against it.
    #[test]
    fn each_site_registers_exactly_one_mux_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kimchi.conf");
        std::fs::write(
            &path,
            "site http+insecure://a.example.com:19001 {\n    file_server /a\n}\n\
             site http+insecure://b.example.com:19001/api {\n    redirect /elsewhere\n}\n",
        )
        .unwrap();

        let top_level = config::load(&path).unwrap();
        let registry = ServerRegistry::new();
        build(&registry, &top_level).unwrap();

        // Both sites share the same (network, address), so they land on one
        // listener; dedup means this returns the listener the router already
        // created rather than a fresh one.
        let listener = registry.add_listener("tcp", "0.0.0.0:19001");
        assert_eq!(registry.listener_count(), 1);
        assert_eq!(listener.route_count(), 2);
    }
}
