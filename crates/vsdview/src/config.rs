use std::path::Path;

use serde::{Deserialize, Serialize};
use vsdview_core::ParseOptions;
use vsdview_render::SvgRenderOptions;

use crate::{ConvertError, Result};

/// Names a default config file when no explicit one is given.
pub const CONFIG_ENV: &str = "VSDVIEW_CONFIG";

/// Parse + render options as loaded from a JSON config file. Missing fields keep their defaults.
///
/// ```json
/// { "parse": { "strict": true }, "render": { "px_per_inch": 96, "media_dir": "out/media" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub parse: ParseOptions,
    pub render: SvgRenderOptions,
}

impl ConvertConfig {
    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|source| ConvertError::Config {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads the file named by `VSDVIEW_CONFIG`; `Ok(None)` when the variable is unset or empty.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => {
                tracing::debug!(path = ?path, "loading config from {CONFIG_ENV}");
                Self::load(path).map(Some)
            }
            _ => Ok(None),
        }
    }
}
