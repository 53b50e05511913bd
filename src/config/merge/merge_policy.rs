//! Builder defaults shared by every load path.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with defaults for keys that sources commonly override.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("session.writable_layer", "layerfs-user.xml")?
        .set_default("session.autosave", false)?
        .set_default("cache.enabled", true)
}
