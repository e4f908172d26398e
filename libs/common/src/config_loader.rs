//! Layered configuration loading
//!
//! Precedence (lowest to highest): struct defaults, YAML file, environment.
//! Command-line overrides are applied by the caller on the extracted value.

use std::path::{Path, PathBuf};

use errors::{SlaveError, SlaveResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Load `T` from defaults, a YAML file and `{env_prefix}`-prefixed variables
///
/// An explicit `file` must exist. Without one, `default_file` is used when it
/// exists and skipped otherwise. Nested keys in the environment are separated
/// by a double underscore: `MBSRV_ENGINE__INTAKE_CAPACITY=128`.
pub fn load_layered<T>(file: Option<&Path>, default_file: &Path, env_prefix: &str) -> SlaveResult<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let source = resolve_config_file(file, default_file)?;

    let mut figment = Figment::from(Serialized::defaults(T::default()));
    match &source {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            figment = figment.merge(Yaml::file(path));
        },
        None => debug!(
            "No configuration file at {}, using defaults",
            default_file.display()
        ),
    }
    figment = figment.merge(Env::prefixed(env_prefix).split("__"));

    Ok(figment.extract()?)
}

fn resolve_config_file(file: Option<&Path>, default_file: &Path) -> SlaveResult<Option<PathBuf>> {
    match file {
        Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(SlaveError::InvalidConfig {
            field: "config".to_string(),
            reason: format!("file not found: {}", path.display()),
        }),
        None if default_file.is_file() => Ok(Some(default_file.to_path_buf())),
        None => Ok(None),
    }
}
