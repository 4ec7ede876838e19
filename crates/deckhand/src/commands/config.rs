//! Config commands.

use anyhow::Result;
use deckhand_core::Config;

use crate::cli::{ConfigAction, ConfigCommand};

/// Execute config command.
pub fn execute(cmd: ConfigCommand, config: &Config) -> Result<()> {
    match cmd.action {
        ConfigAction::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        ConfigAction::Path => println!("{}", Config::config_path().display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
