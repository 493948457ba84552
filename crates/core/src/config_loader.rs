use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from built-in defaults, `config/Config.toml` and
    /// `TWS_`-prefixed environment variables (nested keys split on `__`).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Same as [`ConfigLoader::load`] with an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::base(path)
            .merge(Env::prefixed("TWS_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads configuration with a profile overlay `config/Config.{profile}.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<AppConfig> {
        let overlay = match path.strip_suffix(".toml") {
            Some(stem) => format!("{stem}.{profile}.toml"),
            None => format!("{path}.{profile}"),
        };
        let config: AppConfig = Self::base(path)
            .merge(Toml::file(overlay))
            .merge(Env::prefixed("TWS_").split("__"))
            .extract()?;

        Ok(config)
    }

    fn base(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path))
    }
}
