use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metadata::ExtraLayout;
use crate::recode::EncodeParams;

/// Top-level configuration for a conversion run.
///
/// Controls WEBP encoding, where outputs go and what happens to existing
/// files, and how metadata is laid out in the WEBP.
///
/// # Loading
///
/// ```rust,no_run
/// use png2webp::config::{Config, OverwritePolicy};
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.encoding.lossless = true;
/// config.output.on_existing = OverwritePolicy::Skip;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WEBP encoder settings.
    pub encoding: EncodeParams,
    /// Input traversal and output placement.
    pub output: OutputConfig,
    /// Metadata layout in the WEBP.
    pub metadata: MetadataConfig,
}

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Replace it.
    #[default]
    Overwrite,
    /// Leave it alone and report the file as skipped.
    Skip,
    /// Leave it alone and report the file as failed.
    Error,
}

/// Where converted files are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `<dir>/<stem>.webp`, next to the source.
    #[default]
    SideBySide,
    /// `<input root>/webp/<YYYY_MM_DD>/<stem>.webp`, dated by file creation time.
    Dated,
}

/// Output and traversal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Descend into subdirectories of directory arguments.
    pub recursive: bool,
    pub layout: OutputLayout,
    pub on_existing: OverwritePolicy,
    /// If `true`, plan and report conversions without writing anything.
    pub dry_run: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            layout: OutputLayout::default(),
            on_existing: OverwritePolicy::default(),
            dry_run: false,
        }
    }
}

/// Metadata configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub extra_layout: ExtraLayout,
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::debug!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject encoder settings outside their valid ranges.
    pub fn validate(&self) -> Result<()> {
        let quality = self.encoding.quality;
        if !(0.0..=100.0).contains(&quality) {
            anyhow::bail!("quality must be between 0 and 100, got {quality}");
        }
        if self.encoding.method > 6 {
            anyhow::bail!("method must be between 0 and 6, got {}", self.encoding.method);
        }
        Ok(())
    }
}
