use crate::mafia::{Role, RoleSpec, RoleTable, SessionSettings};
use anyhow::{anyhow, Result};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/mafiabot/config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub mafia: Mafia,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<String>,
    pub command_prefix: String,
}

/// Game settings.  Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Mafia {
    pub lobby_duration_seconds: u64,
    pub round_duration_seconds: u64,
    pub minimum_players: usize,
    pub max_rounds: u32,
    /// Role that absorbs every player not claimed by another role
    pub filler_role: Role,
    pub roles: Vec<RoleSpec>,
}

impl Default for Mafia {
    fn default() -> Self {
        let defaults = SessionSettings::default();
        Self {
            lobby_duration_seconds: defaults.lobby_duration.as_secs(),
            round_duration_seconds: defaults.round_duration.as_secs(),
            minimum_players: defaults.minimum_players,
            max_rounds: defaults.max_rounds,
            filler_role: defaults.roles.filler(),
            roles: defaults.roles.specs().to_vec(),
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents, &path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        // Catch a bad role table now rather than when someone starts a game
        config.mafia.session_settings(None).map_err(|e| {
            anyhow!(
                "Invalid [mafia] section in `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(config)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let new = Self::load().await?;
        *self = new;
        Ok(())
    }
}

impl Mafia {
    /// Settings for a new game.  `lobby_override` comes from the persistent state and wins over
    /// the configured lobby duration.
    pub fn session_settings(&self, lobby_override: Option<u64>) -> Result<SessionSettings> {
        let roles = RoleTable::new(self.filler_role, self.roles.clone())?;
        let lobby_seconds = lobby_override.unwrap_or(self.lobby_duration_seconds);

        Ok(SessionSettings {
            minimum_players: self.minimum_players,
            lobby_duration: Duration::from_secs(lobby_seconds),
            round_duration: Duration::from_secs(self.round_duration_seconds),
            max_rounds: self.max_rounds,
            roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERAL: &str = r#"
        [general]
        discord_token = "token"
        bot_owners = ["owner"]
        command_prefix = ";"
    "#;

    fn parse(contents: &str) -> Result<Config> {
        Config::parse(contents, Path::new("config.toml"))
    }

    #[test]
    fn mafia_section_is_optional() {
        let config = parse(GENERAL).unwrap();
        assert_eq!(config.general.command_prefix, ";");
        assert_eq!(config.mafia, Mafia::default());

        let settings = config.mafia.session_settings(None).unwrap();
        assert_eq!(settings, SessionSettings::default());
    }

    #[test]
    fn custom_roles_are_read() {
        let contents = format!(
            "{}{}",
            GENERAL,
            r#"
            [mafia]
            lobby_duration_seconds = 30
            minimum_players = 5

            [[mafia.roles]]
            role = "Town"
            percentage = 0.8

            [[mafia.roles]]
            role = "Mafia"
            percentage = 0.2
            minimum = 1
            "#
        );
        let config = parse(&contents).unwrap();

        assert_eq!(config.mafia.lobby_duration_seconds, 30);
        assert_eq!(config.mafia.minimum_players, 5);
        assert_eq!(config.mafia.round_duration_seconds, 120);

        let settings = config.mafia.session_settings(None).unwrap();
        assert_eq!(settings.lobby_duration, Duration::from_secs(30));
        assert_eq!(
            settings.roles.buckets(5).unwrap(),
            vec![(Role::Mafia, 1), (Role::Town, 4)]
        );
    }

    #[test]
    fn lobby_override_wins() {
        let settings = Mafia::default().session_settings(Some(5)).unwrap();
        assert_eq!(settings.lobby_duration, Duration::from_secs(5));
    }

    #[test]
    fn bad_role_table_is_rejected_at_load() {
        let contents = format!(
            "{}{}",
            GENERAL,
            r#"
            [[mafia.roles]]
            role = "Mafia"
            percentage = 0.2
            "#
        );
        let err = parse(&contents).err().unwrap();
        assert!(err.to_string().contains("filler role Town"));
    }

    #[test]
    fn table_without_mafia_is_rejected_at_load() {
        let contents = format!(
            "{}{}",
            GENERAL,
            r#"
            [[mafia.roles]]
            role = "Town"
            percentage = 0.8

            [[mafia.roles]]
            role = "Mafia"
            percentage = 0.0
            "#
        );
        let err = parse(&contents).err().unwrap();
        assert!(err.to_string().contains("no mafia role"));
    }

    #[test]
    fn unknown_role_is_a_parse_error() {
        let contents = format!(
            "{}{}",
            GENERAL,
            r#"
            [[mafia.roles]]
            role = "Werewolf"
            percentage = 0.2
            "#
        );
        assert!(parse(&contents).is_err());
    }
}
