//! `config show|set|reset|path`

use std::error::Error;
use std::path::Path;

use crate::cli::settings::{apply_setting, format_all, SettingError, SettingRegistry};
use crate::cli::ConfigCommands;
use crate::core::config::data::path_display;
use crate::core::config::Settings;

pub fn run_config(explicit: Option<&Path>, command: ConfigCommands) -> Result<(), Box<dyn Error>> {
    let path = Settings::resolve_path(explicit)?;
    let registry = SettingRegistry::new();

    match command {
        ConfigCommands::Show => {
            let settings = Settings::load_from_path(&path)?;
            println!("Settings ({}):", path_display(&path));
            for line in format_all(&registry, &settings) {
                println!("{line}");
            }
        }
        ConfigCommands::Set { key, value } => {
            let settings = Settings::load_from_path(&path)?;
            let (updated, message) = match apply_setting(&registry, &settings, &key, &value) {
                Ok(result) => result,
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            };
            if let Err(err) = updated.save_to_path(&path) {
                SettingError::ConfigError(err.to_string()).print();
                std::process::exit(1);
            }
            println!("{message}");

            let mut effective = updated;
            effective.apply_env_fallback();
            if let Err(err) = effective.validate() {
                eprintln!("⚠️  {err}");
            }
        }
        ConfigCommands::Reset => {
            Settings::default().save_to_path(&path)?;
            println!("✅ Restored default settings at {}", path_display(&path));
        }
        ConfigCommands::Path => {
            println!("{}", path_display(&path));
        }
    }
    Ok(())
}
