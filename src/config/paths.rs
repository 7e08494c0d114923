//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\interview-proctor\
//!   macOS:   ~/Library/Application Support/interview-proctor/
//!   Linux:   ~/.config/interview-proctor/
//!
//! Data dir (models, recordings):
//!   Windows: %LOCALAPPDATA%\interview-proctor\
//!   macOS:   ~/Library/Application Support/interview-proctor/
//!   Linux:   ~/.local/share/interview-proctor/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for GGML recognition models.
    pub models_dir: PathBuf,
    /// Default export directory for session recordings.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "interview-proctor";

    /// Resolves all paths, falling back to the current directory when the
    /// platform provides no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
            recordings_dir: data_dir.join("recordings"),
        }
    }

    /// Full path of a recognition model given its file stem.
    pub fn model_file(&self, stem: &str) -> PathBuf {
        self.models_dir.join(format!("{stem}.bin"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
