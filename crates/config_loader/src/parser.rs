//! 文本 <-> `TelemetryBlueprint`
//!
//! 格式只看扩展名：`.toml` 或 `.json`，大小写不敏感。

use std::path::Path;

use contracts::{ContractError, TelemetryBlueprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// 文件没有扩展名或扩展名不认识时报 `ConfigParse`
    pub(crate) fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{} has no .toml or .json extension",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported telemetry config extension .{ext}"))
        })
    }

    pub(crate) fn parse(self, content: &str) -> Result<TelemetryBlueprint, ContractError> {
        match self {
            Self::Toml => parse_toml(content),
            Self::Json => parse_json(content),
        }
    }

    /// 反向：把蓝图渲染成本格式的可读文本
    pub(crate) fn render(self, blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        let rendered = match self {
            Self::Toml => toml::to_string_pretty(blueprint).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(blueprint).map_err(|e| e.to_string()),
        };
        rendered.map_err(|e| ContractError::config_parse(format!("cannot render as {self:?}: {e}")))
    }
}

fn parse_toml(content: &str) -> Result<TelemetryBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("telemetry config (TOML): {e}"),
        source: Some(Box::new(e)),
    })
}

fn parse_json(content: &str) -> Result<TelemetryBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("telemetry config (JSON): {e}"),
        source: Some(Box::new(e)),
    })
}
