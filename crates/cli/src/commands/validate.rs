//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DisconnectPolicy, TelemetryBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    server: String,
    source: String,
    parameter_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    server: blueprint.server.addr(),
                    source: blueprint.receiver.addr(),
                    parameter_count: blueprint.source.parameters.len(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &TelemetryBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - received records will be dropped".to_string());
    }

    if blueprint.source.parameters.is_empty() {
        warnings.push("source.parameters is empty - using the default ten parameters".to_string());
    }

    if blueprint.source.change_probability == 0.0 {
        warnings.push("source.change_probability is 0 - no value will ever change".to_string());
    }

    if blueprint.receiver.on_disconnect == DisconnectPolicy::KeepSinks && blueprint.sinks.is_empty()
    {
        warnings.push("receiver.on_disconnect = keep_sinks has no effect without sinks".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Server: {}", summary.server);
            println!("  Source: {}", summary.source);
            println!("  Parameters: {}", summary.parameter_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn validate_text(text: &str) -> ValidationResult {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{text}").unwrap();
        validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        })
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&ValidateArgs {
            config: PathBuf::from("/nonexistent/telemetry.toml"),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_with_warnings() {
        let result = validate_text("[server]\nport = 6000\n");
        assert!(result.valid);
        assert_eq!(result.summary.as_ref().unwrap().server, "127.0.0.1:6000");
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No sinks")));
    }

    #[test]
    fn test_invalid_config() {
        let result = validate_text(
            "[[sinks]]\nname = \"table\"\nsink_type = \"file\"\n",
        );
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("path"));
    }
}
