/*
[INPUT]:  Optional YAML configuration file, KYC_HANDOFF_* environment variables
[OUTPUT]: Validated HandoffConfig
[POS]:    Configuration layer - layered loading for the runner
[UPDATE]: When adding configuration sources or changing override rules
*/

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use kyc_handoff_adapter::HandoffConfig;

/// Prefix of environment overrides, e.g. `KYC_HANDOFF_CHAIN_ID` or
/// `KYC_HANDOFF_WIDGET__INIT_MAX_ATTEMPTS`
pub const ENV_PREFIX: &str = "KYC_HANDOFF";
pub const ENV_SEPARATOR: &str = "__";

/// Load configuration from `path` (if any) overlaid with the process environment
pub fn load_config(path: Option<&Path>) -> Result<HandoffConfig> {
    load_config_with_env(path, None)
}

/// Same as [`load_config`] but reads overrides from `env` instead of the
/// process environment when given
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<HandoffConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );

    let config: HandoffConfig = builder
        .build()
        .context("read configuration sources")?
        .try_deserialize()
        .context("parse handoff configuration")?;
    config.validate().context("validate handoff configuration")?;
    Ok(config)
}
