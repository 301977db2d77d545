//! # Config Loader
//!
//! Turns a `.toml` or `.json` file into a checked [`TelemetryBlueprint`].
//! Nothing past this crate sees a blueprint that failed [`ConfigLoader::validate`].
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("telemetry.toml"))?;
//! println!("broadcasting on {}", blueprint.server.addr());
//! # Ok::<(), contracts::ContractError>(())
//! ```

mod parser;
mod validator;

pub use contracts::TelemetryBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and check a blueprint; the extension picks the format
    pub fn load_from_path(path: &Path) -> Result<TelemetryBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TelemetryBlueprint, ContractError> {
        let blueprint = format.parse(content)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-check a blueprint that was changed after loading
    pub fn validate(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        ConfigFormat::Toml.render(blueprint)
    }

    pub fn to_json(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        ConfigFormat::Json.render(blueprint)
    }
}
