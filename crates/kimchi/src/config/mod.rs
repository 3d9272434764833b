//! Configuration file loading: tokenizing, parsing, and `import` glob
//! resolution. The result is a flat list of top-level directives with every
//! `import` spliced away, ready for the site router to walk.

mod directive;
pub mod site;

pub use directive::Directive;
pub use site::Site;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Loads the top-level `site` directives from `path`, resolving any
/// `import <glob>` directives (recursively, with cycle detection) along the
/// way.
pub fn load(path: &Path) -> Result<Vec<Directive>, ConfigError> {
    let mut in_progress = HashSet::new();
    load_file(path, &mut in_progress)
}

fn load_file(
    path: &Path,
    in_progress: &mut HashSet<PathBuf>,
) -> Result<Vec<Directive>, ConfigError> {
    let canonical = canonicalize_best_effort(path);
    if !in_progress.insert(canonical.clone()) {
        return Err(ConfigError::ImportCycle(path.to_path_buf()));
    }

    let text = fs_err::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let directives = directive::parse_file(path, &text)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut resolved = Vec::new();
    for d in directives {
        if d.name == "import" {
            resolved.extend(resolve_import(&d, base_dir, in_progress)?);
        } else {
            resolved.push(d);
        }
    }

    in_progress.remove(&canonical);
    Ok(resolved)
}

fn resolve_import(
    d: &Directive,
    base_dir: &Path,
    in_progress: &mut HashSet<PathBuf>,
) -> Result<Vec<Directive>, ConfigError> {
    let pattern = d
        .args
        .first()
        .ok_or_else(|| ConfigError::ArgCount {
            file: d.file.clone(),
            line: d.line,
            directive: "import".to_string(),
            want: "1".to_string(),
            got: 0,
        })?
        .clone();

    let full_pattern = base_dir.join(&pattern);
    let full_pattern_str = full_pattern.to_string_lossy().into_owned();

    let paths = glob::glob(&full_pattern_str).map_err(|e| ConfigError::ImportGlobPattern {
        file: d.file.clone(),
        line: d.line,
        pattern: pattern.clone(),
        source: e,
    })?;

    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(p) => matches.push(p),
            Err(e) => {
                let path = e.path().to_path_buf();
                let source = std::io::Error::new(e.error().kind(), e.error().to_string());
                return Err(ConfigError::Io { path, source });
            }
        }
    }

    if matches.is_empty() {
        return Err(ConfigError::ImportNoMatch {
            file: d.file.clone(),
            line: d.line,
            pattern,
        });
    }

    let mut out = Vec::new();
    for m in matches {
        out.extend(load_file(&m, in_progress)?);
    }
    Ok(out)
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn loads_sites_from_a_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kimchi.conf");
        std::fs::write(
            &path,
            "site example.com {\n    file_server /srv/www\n}\n",
        )
        .unwrap();
        let dirs = load(&path).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "site");
    }

    #[test]
    fn resolves_import_glob_in_declaration_order() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sites")).unwrap();
        std::fs::write(
            dir.path().join("sites/a.conf"),
            "site a.example.com {\n    file_server /a\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("sites/b.conf"),
            "site b.example.com {\n    file_server /b\n}\n",
        )
        .unwrap();
        let mut root = std::fs::File::create(dir.path().join("kimchi.conf")).unwrap();
        writeln!(root, "import sites/*.conf").unwrap();

        let dirs = load(&dir.path().join("kimchi.conf")).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.iter().all(|d| d.name == "site"));
    }

    #[test]
    fn import_matching_nothing_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kimchi.conf");
        std::fs::write(&path, "import nosuch/*.conf\n").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn import_cycle_is_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.conf"), "import b.conf\n").unwrap();
        std::fs::write(dir.path().join("b.conf"), "import a.conf\n").unwrap();
        assert!(load(&dir.path().join("a.conf")).is_err());
    }
}
