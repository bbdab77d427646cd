use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Model configuration: `type` selects the engine, `path` locates the
/// serialized model. Every other key is kept for the engine to interpret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "type")]
    pub model_type: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: toml::Table,
}

impl ModelConfig {
    pub fn new(model_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            model_type: model_type.into(),
            path: path.into(),
            options: toml::Table::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_type.trim().is_empty() {
            return Err(Error::config("missing required option `type`"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(Error::config("missing required option `path`"));
        }
        Ok(())
    }

    pub fn option_str(&self, key: &str) -> Result<Option<&str>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Error::config(format!(
                "option `{key}` must be a string, got {}",
                other.type_str()
            ))),
        }
    }

    pub fn option_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) => usize::try_from(*i).map(Some).map_err(|_| {
                Error::config(format!("option `{key}` must be non-negative, got {i}"))
            }),
            Some(other) => Err(Error::config(format!(
                "option `{key}` must be an integer, got {}",
                other.type_str()
            ))),
        }
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = toml::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(text.trim_end())
    }
}
