use std::str::FromStr;

use anyhow::{Result, bail};
use serde::Serialize;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON - machine-parseable
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Use: text or json"),
        }
    }
}

impl OutputFormat {
    /// Serialize data to the requested format
    pub fn serialize<T: Serialize>(self, data: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(data)
                .map_err(|e| anyhow::anyhow!("JSON serialization failed: {e}")),
            Self::Text => bail!("Text format should not use serialize()"),
        }
    }

    /// Print `data` as JSON, or as the lines `text` renders.
    pub fn emit<T: Serialize>(self, data: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
        let out = match self {
            Self::Json => self.serialize(data)?,
            Self::Text => text(data),
        };
        if !out.is_empty() {
            println!("{}", out.trim_end_matches('\n'));
        }
        Ok(())
    }
}
