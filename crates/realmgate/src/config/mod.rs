//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > CLI > defaults.
//! Callers apply CLI values to the builder they pass in; file and
//! environment values are layered on top.

mod builder;
mod env;
mod file;

pub use builder::{
    CertificateConfig, CertificateSettings, Config, ConfigBuilder, OidcConfig, OidcSettings,
    PolicyConfig, RealmsConfig, TelemetryConfig, TicketConfig, TicketSettings, TokenStoreConfig,
};
pub use file::find_config_file;

use crate::Result;

/// Layer the discovered config file, then the environment, over `builder`
pub fn load_config(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Some(path) = find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    env::load_from_env(builder)
}

/// Layer a specific config file, then the environment, over `builder`
pub fn load_config_from_path(path: &std::path::Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, builder)?;
    env::load_from_env(builder)
}
