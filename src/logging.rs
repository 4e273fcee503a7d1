//! Diagnostic logging for the compiler binary.
//!
//! Nothing is installed unless `PHPJS_LOG` (or `RUST_LOG`) is set. The value
//! uses the usual filter syntax:
//!
//! ```bash
//! PHPJS_LOG=debug phpjs compile src/Main.php
//! PHPJS_LOG="phpjs_compiler::compiler=trace" PHPJS_LOG_FORMAT=json phpjs compile src/Main.php
//! ```
//!
//! Output always goes to stderr; stdout carries the generated program.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("PHPJS_LOG_FORMAT").unwrap_or_default())
    }
}

fn build_filter() -> EnvFilter {
    match std::env::var("PHPJS_LOG") {
        Ok(val) => EnvFilter::builder().parse_lossy(val),
        Err(_) => EnvFilter::from_default_env(),
    }
}

pub fn init_tracing() {
    if std::env::var("PHPJS_LOG").is_err() && std::env::var("RUST_LOG").is_err() {
        return;
    }
    let filter = build_filter();
    match LogFormat::from_env() {
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);
            Registry::default().with(filter).with(json_layer).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }
}
