//! Config command.

use anyhow::Result;
use koinonia_core::Config;

use super::CommonArgs;
use crate::ui;

/// Config command action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Validate the config file.
    Validate,
    /// Print the config file path.
    Path,
}

/// Run the config command.
pub fn run_config(common: CommonArgs, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", common.config_path.display());
            Ok(())
        }
        ConfigAction::Validate => {
            if !common.config_path.exists() {
                ui::warning(&format!(
                    "Config file not found: {} (defaults apply)",
                    common.config_path.display()
                ));
            }
            match common.loaded {
                Ok(config) => {
                    config.validate()?;
                    if config.service.url.is_none() || config.service.anon_key.is_none() {
                        ui::warning("service.url and service.anonKey are not both set");
                    }
                    ui::success("Configuration is valid");
                    Ok(())
                }
                Err(e) => {
                    ui::error(&e.to_string());
                    anyhow::bail!("Configuration is invalid");
                }
            }
        }
        ConfigAction::Show => {
            let config = common.config()?;
            println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
            Ok(())
        }
    }
}

/// Effective config as JSON with the anon key masked.
fn redacted(config: &Config) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(key) = value.pointer_mut("/service/anonKey") {
        if !key.is_null() {
            *key = serde_json::Value::String("[REDACTED]".to_string());
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_anon_key() {
        let mut config = Config::default();
        config.service.url = Some("https://abcd.supabase.co".to_string());
        config.service.anon_key = Some("anon-secret".to_string());

        let value = redacted(&config).unwrap();
        assert_eq!(value["service"]["anonKey"], "[REDACTED]");
        assert_eq!(value["service"]["url"], "https://abcd.supabase.co");
        assert_eq!(value["routes"]["loginPath"], "/login");
    }

    #[test]
    fn test_redacted_leaves_missing_key() {
        let value = redacted(&Config::default()).unwrap();
        assert!(value["service"]["anonKey"].is_null());
    }

    #[test]
    fn test_validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("koinonia.json");
        std::fs::write(&path, "{ routes: { loginPath: 'login' } }").unwrap();

        let common = CommonArgs {
            loaded: Config::load(&path),
            config_path: path,
        };
        assert!(run_config(common, ConfigAction::Validate).is_err());
    }
}
