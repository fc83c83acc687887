//! Environment configuration
//!
//! Loaded from an optional TOML file plus `TEMPLATE__*` environment
//! variables (after reading `.env` if present). Environment variables win
//! over the file, and builder overrides win over both.
//!
//! ```toml
//! extensions = ["try_catch", "do"]
//! enable_async = true
//! native = false
//! undefined = "strict"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::runtime::UndefinedBehavior;

const ENV_PREFIX: &str = "TEMPLATE";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Built-in extensions to activate, by name (`"try_catch"`, `"do"`)
    pub extensions: Vec<String>,
    pub enable_async: bool,
    pub native: bool,
    pub undefined: UndefinedBehavior,
    pub trim_blocks: bool,
    pub keep_trailing_newline: bool,
}

impl EnvConfig {
    pub fn builder() -> EnvConfigBuilder {
        EnvConfigBuilder::default()
    }

    /// Load from `path` (if given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("extensions"),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

/// Builder for [`EnvConfig`]
#[derive(Debug, Default)]
pub struct EnvConfigBuilder {
    config_path: Option<PathBuf>,
    extensions: Option<Vec<String>>,
    enable_async: Option<bool>,
    native: Option<bool>,
    undefined: Option<UndefinedBehavior>,
}

impl EnvConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    pub fn enable_async(mut self, enabled: bool) -> Self {
        self.enable_async = Some(enabled);
        self
    }

    pub fn native(mut self, native: bool) -> Self {
        self.native = Some(native);
        self
    }

    pub fn undefined(mut self, undefined: UndefinedBehavior) -> Self {
        self.undefined = Some(undefined);
        self
    }

    pub fn build(self) -> Result<EnvConfig, ConfigError> {
        let mut config = EnvConfig::load(self.config_path.as_deref())?;
        if let Some(extensions) = self.extensions {
            config.extensions = extensions;
        }
        if let Some(enabled) = self.enable_async {
            config.enable_async = enabled;
        }
        if let Some(native) = self.native {
            config.native = native;
        }
        if let Some(undefined) = self.undefined {
            config.undefined = undefined;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str() {
        let config = EnvConfig::from_toml_str(
            r#"
            extensions = ["try_catch", "do"]
            enable_async = true
            undefined = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.extensions, vec!["try_catch", "do"]);
        assert!(config.enable_async);
        assert!(!config.native);
        assert_eq!(config.undefined, UndefinedBehavior::Strict);
    }

    #[test]
    fn test_from_toml_str_defaults() {
        let config = EnvConfig::from_toml_str("").unwrap();
        assert_eq!(config, EnvConfig::default());
    }

    #[test]
    fn test_from_toml_str_rejects_bad_types() {
        let err = EnvConfig::from_toml_str("enable_async = \"maybe\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_file_env_and_overrides() {
        let path = std::env::temp_dir().join(format!(
            "jinja-try-catch-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "extensions = [\"try_catch\"]\nnative = true\n").unwrap();
        std::env::set_var("TEMPLATE__TRIM_BLOCKS", "true");

        let config = EnvConfig::builder()
            .config_path(Some(path.clone()))
            .undefined(UndefinedBehavior::Strict)
            .build()
            .unwrap();

        std::env::remove_var("TEMPLATE__TRIM_BLOCKS");
        std::fs::remove_file(&path).ok();

        assert_eq!(config.extensions, vec!["try_catch"]);
        assert!(config.native);
        assert!(config.trim_blocks);
        assert_eq!(config.undefined, UndefinedBehavior::Strict);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = EnvConfig::load(Some(Path::new("/nonexistent/template.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
