//! Global config file: $XDG_CONFIG_HOME/layerfs/config.toml

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};

/// Add the global config file, if one exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg::global_config_path() {
        Ok(path) => Ok(builder.add_source(File::from(path.as_path()).required(false))),
        Err(e) => {
            tracing::debug!(error = %e, "No global config location");
            Ok(builder)
        }
    }
}
