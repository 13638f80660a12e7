use anyhow::{anyhow, Result};
use std::{io::ErrorKind, path::PathBuf};

const PSTATE_PATH_REL_HOME: &str = ".config/mafiabot/state.toml";

/// Settings changed through bot commands.  These persist across sessions; games do not.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub mafia: MafiaOverrides,
}

/// Overrides for values in the `[mafia]` section of the configuration.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct MafiaOverrides {
    pub lobby_duration_seconds: Option<u64>,
}

impl PersistentState {
    fn state_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(PSTATE_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Load state from disk.  A missing file is a fresh install, not an error.
    pub async fn load() -> Result<Self> {
        let path = Self::state_path()?;

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow!(
                    "Could not read state at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        let pstate: PersistentState = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse state at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(pstate)
    }

    pub async fn save(&self) -> Result<()> {
        let path = Self::state_path()?;
        let pstate_str = toml::to_string_pretty(&self)
            .map_err(|e| anyhow!("Could not serialize state: {}", e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow!(
                    "Could not create directory `{}`: {}",
                    parent.to_string_lossy(),
                    e
                )
            })?;
        }

        // Write next to the target, then rename over it so a crash never leaves half a file.
        let tmp_path = path.with_extension("toml.new");

        tokio::fs::write(&tmp_path, pstate_str).await.map_err(|e| {
            anyhow!(
                "Could not write state to temporary file `{}`: {}",
                tmp_path.to_string_lossy(),
                e
            )
        })?;

        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            anyhow!(
                "Could not rename temporary file `{}` to `{}`: {}",
                tmp_path.to_string_lossy(),
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_no_overrides() {
        let pstate: PersistentState = toml::from_str("").unwrap();
        assert_eq!(pstate.mafia.lobby_duration_seconds, None);
    }

    #[test]
    fn lobby_override_survives_a_save() {
        let mut pstate = PersistentState::default();
        pstate.mafia.lobby_duration_seconds = Some(45);

        let text = toml::to_string_pretty(&pstate).unwrap();
        assert!(text.contains("lobby_duration_seconds = 45"));

        let reloaded: PersistentState = toml::from_str(&text).unwrap();
        assert_eq!(reloaded.mafia.lobby_duration_seconds, Some(45));
    }
}
