//! Desktop file layout

use bridge_traits::{
    error::{BridgeError, Result},
    storage::PathResolver,
};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = ".anitail";

/// Canonical desktop locations
///
/// Everything lives under `~/.anitail` except scheduled backups, which go to
/// `<Downloads>/AniTail/AutoBackup` so users can find them.
#[derive(Debug, Clone)]
pub struct DesktopPaths {
    app_data: PathBuf,
    downloads: PathBuf,
}

impl DesktopPaths {
    /// Resolve paths from the current user's home directory.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            BridgeError::NotAvailable("Unable to determine the home directory".to_string())
        })?;
        let downloads = dirs::download_dir().unwrap_or_else(|| home.join("Downloads"));
        Ok(Self {
            app_data: home.join(APP_DIR_NAME),
            downloads,
        })
    }

    /// Root every location at `root` (used by tests and portable installs).
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            app_data: root.join(APP_DIR_NAME),
            downloads: root.join("Downloads"),
        }
    }
}

impl PathResolver for DesktopPaths {
    fn app_data_dir(&self) -> PathBuf {
        self.app_data.clone()
    }

    fn database_dir(&self) -> PathBuf {
        self.app_data.join("database")
    }

    fn preferences_file(&self) -> PathBuf {
        self.app_data.join("preferences.json")
    }

    fn credentials_file(&self) -> PathBuf {
        self.app_data.join("credentials.json")
    }

    fn lyrics_overrides_file(&self) -> PathBuf {
        self.app_data.join("lyrics_overrides.json")
    }

    fn pending_scrobbles_file(&self) -> PathBuf {
        self.app_data.join("lastfm_pending_scrobbles.json")
    }

    fn passthrough_settings_file(&self) -> PathBuf {
        self.app_data.join("settings.preferences_pb")
    }

    fn legacy_scrobbles_file(&self) -> PathBuf {
        self.app_data.join("lastfm_offline.xml")
    }

    fn auto_backup_dir(&self) -> PathBuf {
        self.downloads.join("AniTail").join("AutoBackup")
    }
}
