pub mod doc;
pub mod pubsub;
pub mod queue;
pub mod sql;

pub use doc::DocCommand;
pub use pubsub::{PublishCommand, SubscribeCommand};
pub use queue::QueueCommand;
pub use sql::SqlCommand;

use anyhow::Context;
use serde_json::Value;

/// Runtime for one command
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}

/// JSON given inline, or read from a file when prefixed with `@`
fn parse_json_arg(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON from {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON: {}", text.trim()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_inline_json() {
        assert_eq!(
            parse_json_arg(r#"{"id": 1}"#).unwrap(),
            serde_json::json!({"id": 1})
        );
        assert!(parse_json_arg("{not json").is_err());
    }

    #[test]
    fn test_parse_json_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"table": "t"}}"#).unwrap();

        let arg = format!("@{}", file.path().display());
        assert_eq!(
            parse_json_arg(&arg).unwrap(),
            serde_json::json!({"table": "t"})
        );
        assert!(parse_json_arg("@/nonexistent/descriptor.json").is_err());
    }
}
