//! Tiered error types.
//!
//! Configuration errors are reported once at startup and are fatal. Connection
//! errors are logged and drop only the offending connection. Fatal runtime
//! errors terminate the process. `anyhow` is used at the process boundary
//! (the `kimchi-cli` binary); everything below that uses these enums.

use std::path::PathBuf;

/// Errors produced while tokenizing, parsing, or resolving the configuration
/// file into sites.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{file}:{line}: unexpected character {ch:?}")]
    UnexpectedChar { file: PathBuf, line: usize, ch: char },

    #[error("{file}:{line}: unterminated quoted string")]
    UnterminatedString { file: PathBuf, line: usize },

    #[error("{file}:{line}: unexpected '}}' with no open block")]
    UnmatchedCloseBrace { file: PathBuf, line: usize },

    #[error("{file}:{line}: unclosed block")]
    UnclosedBlock { file: PathBuf, line: usize },

    #[error("{file}:{line}: unknown directive {name:?}")]
    UnknownDirective {
        file: PathBuf,
        line: usize,
        name: String,
    },

    #[error("{file}:{line}: {directive} requires {want} argument(s), got {got}")]
    ArgCount {
        file: PathBuf,
        line: usize,
        directive: String,
        want: String,
        got: usize,
    },

    #[error("import {pattern:?} ({file}:{line}) matched no files")]
    ImportNoMatch {
        file: PathBuf,
        line: usize,
        pattern: String,
    },

    #[error("import {pattern:?} ({file}:{line}) is invalid: {source}")]
    ImportGlobPattern {
        file: PathBuf,
        line: usize,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("import cycle detected: {0:?} imports itself transitively")]
    ImportCycle(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("site {uri:?}: unknown scheme {scheme:?}")]
    UnknownScheme { uri: String, scheme: String },

    #[error("site {uri:?}: path {path:?} must start with '/'")]
    BadPath { uri: String, path: String },

    #[error("site {uri:?}: no backend directive given; one of file_server, reverse_proxy, redirect is required")]
    MissingBackend { uri: String },

    #[error("site {uri:?}: multiple HTTP backend directives provided")]
    MultipleBackends { uri: String },

    #[error("header middleware: duplicate header name {0:?}")]
    DuplicateHeaderName(String),

    #[error("{directive}: invalid argument {arg:?}: {reason}")]
    InvalidArg {
        directive: String,
        arg: String,
        reason: String,
    },
}

/// Errors that drop a single connection without affecting the listener.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("malformed PROXY header: {0}")]
    ProxyHeader(String),

    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("failed to bind {network} {address}: {source}")]
    Bind {
        network: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed on listener {address}: {source}")]
    Accept {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP/1 server loop on listener {address} aborted: {source}")]
    Http1ServerAborted {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
