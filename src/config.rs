//! Configuration file support
//!
//! Settings come from a TOML file, then command-line flags override them.
//!
//! Lookup order when no explicit path is given:
//! 1. `./page-inspector.toml`
//! 2. `<config dir>/page-inspector/config.toml`
//! 3. Built-in defaults
//!
//! ```toml
//! root_dir = "/srv/inspection"
//! temp_image_size = 2000
//! grid_size = 10
//! max_cores = 4
//! preset = "default.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

// ============================================================
// Constants
// ============================================================

/// Application directory name under the platform config and data dirs
pub const APP_DIR: &str = "page-inspector";

/// Config file name in the working directory
pub const LOCAL_CONFIG_FILE: &str = "page-inspector.toml";

/// Config file name under the platform config dir
pub const CONFIG_FILE: &str = "config.toml";

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Config
// ============================================================

/// Inspection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of presets, models, temp and output folders
    pub root_dir: PathBuf,
    /// Edge length of normalized pages
    pub temp_image_size: u32,
    /// Patches per page edge
    pub grid_size: u32,
    /// Upper bound on worker threads in batch mode
    pub max_cores: usize,
    /// Extension of raw scans
    pub raw_extension: String,
    pub watch_poll_ms: u64,
    /// Wait after a new scan appears before reading it
    pub settle_delay_ms: u64,
    pub results_poll_ms: u64,
    /// Per-worker deadline when stopping the live pipeline
    pub stop_timeout_ms: u64,
    /// Class buffer size that triggers a spill to disk
    pub spill_threshold: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Preset file name under `presets/`
    pub preset: Option<String>,
    /// Confirmation model file name under `root_dir`
    pub confirm_model: String,
    pub confirm_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            temp_image_size: 2000,
            grid_size: 10,
            max_cores: 4,
            raw_extension: "tif".to_string(),
            watch_poll_ms: 1000,
            settle_delay_ms: 4000,
            results_poll_ms: 100,
            stop_timeout_ms: 5000,
            spill_threshold: 10_000,
            retry_attempts: 10,
            retry_delay_ms: 5000,
            preset: None,
            confirm_model: "blur_detection_model.onnx".to_string(),
            confirm_batch_size: 64,
        }
    }
}

fn default_root_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Load from the first config file found, or defaults
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load from an explicit file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Candidate config file locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_DIR).join(CONFIG_FILE));
        }
        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(ConfigError::Invalid("grid_size must be positive".into()));
        }
        if self.temp_image_size < self.grid_size {
            return Err(ConfigError::Invalid(format!(
                "temp_image_size {} is smaller than grid_size {}",
                self.temp_image_size, self.grid_size
            )));
        }
        if self.spill_threshold == 0 {
            return Err(ConfigError::Invalid("spill_threshold must be positive".into()));
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn merge_with_cli(mut self, cli: &CliOverrides) -> Self {
        if let Some(root) = &cli.root_dir {
            self.root_dir = root.clone();
        }
        if let Some(size) = cli.temp_image_size {
            self.temp_image_size = size;
        }
        if let Some(grid) = cli.grid_size {
            self.grid_size = grid;
        }
        if let Some(cores) = cli.max_cores {
            self.max_cores = cores;
        }
        if let Some(preset) = &cli.preset {
            self.preset = Some(preset.clone());
        }
        if let Some(ext) = &cli.raw_extension {
            self.raw_extension = ext.clone();
        }
        self
    }

    /// Transient I/O retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    /// Worker count for batch mode: `min(max_cores, available cores)`
    pub fn worker_count(&self) -> usize {
        self.max_cores.clamp(1, num_cpus::get().max(1))
    }

    /// Patch edge length in a normalized page
    pub fn patch_size(&self) -> u32 {
        self.temp_image_size / self.grid_size.max(1)
    }

    pub fn presets_dir(&self) -> PathBuf {
        self.root_dir.join("presets")
    }

    /// Path of the configured (or given) preset
    pub fn preset_path(&self, name: Option<&str>) -> Option<PathBuf> {
        name.or(self.preset.as_deref())
            .map(|n| self.presets_dir().join(n))
    }

    pub fn confirm_model_path(&self) -> PathBuf {
        self.root_dir.join(&self.confirm_model)
    }

    /// Output and scratch locations for one book
    pub fn book_paths(&self, barcode: &str) -> BookPaths {
        BookPaths::new(&self.root_dir, barcode)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_dir: Option<PathBuf>,
    pub temp_image_size: Option<u32>,
    pub grid_size: Option<u32>,
    pub max_cores: Option<usize>,
    pub preset: Option<String>,
    pub raw_extension: Option<String>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================
// Book Paths
// ============================================================

/// Per-book folders under the root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPaths {
    pub barcode: String,
    /// Normalized pages and the coordinate map
    pub temp_images: PathBuf,
    /// Spill files
    pub temp_files: PathBuf,
    /// Collage folders, one per defect class
    pub collages: PathBuf,
    /// Defect map XML
    pub defect_map: PathBuf,
}

impl BookPaths {
    pub fn new(root: &Path, barcode: &str) -> Self {
        let collage_root = root.join("collages");
        Self {
            barcode: barcode.to_string(),
            temp_images: root.join("temp_images").join(barcode),
            temp_files: root.join("temp_files").join(barcode),
            collages: collage_root.join(barcode),
            defect_map: collage_root.join(format!("{}_patches.xml", barcode)),
        }
    }

    /// Book barcode from a scan folder path (its final component)
    pub fn barcode_of(folder: &Path) -> Option<String> {
        folder
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
    }

    pub fn coord_map(&self) -> PathBuf {
        self.temp_images.join(crate::geometry::COORD_MAP_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.temp_image_size, 2000);
        assert_eq!(config.grid_size, 10);
        assert_eq!(config.patch_size(), 200);
        assert_eq!(config.spill_threshold, 10_000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.root_dir.ends_with(APP_DIR));
        assert!(config
            .confirm_model_path()
            .ends_with("blur_detection_model.onnx"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("grid_size = 8\nroot_dir = \"/srv/books\"\n").unwrap();
        assert_eq!(config.grid_size, 8);
        assert_eq!(config.root_dir, PathBuf::from("/srv/books"));
        assert_eq!(config.temp_image_size, 2000);
        assert_eq!(config.raw_extension, "tif");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("grid_size = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml("grid_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_cores = 2\npreset = \"books.json\"\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.max_cores, 2);
        assert_eq!(
            config.preset_path(None),
            Some(config.root_dir.join("presets").join("books.json"))
        );

        assert!(matches!(
            Config::load_from_path(&dir.path().join("missing.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_merge_with_cli() {
        let overrides = CliOverrides {
            root_dir: Some(PathBuf::from("/tmp/root")),
            grid_size: Some(5),
            preset: Some("cli.json".into()),
            ..CliOverrides::new()
        };
        let config = Config::default().merge_with_cli(&overrides);
        assert_eq!(config.root_dir, PathBuf::from("/tmp/root"));
        assert_eq!(config.grid_size, 5);
        assert_eq!(config.preset.as_deref(), Some("cli.json"));
        assert_eq!(config.max_cores, 4);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        assert_eq!(Config::from_toml(&config.to_toml()).unwrap(), config);
    }

    #[test]
    fn test_book_paths() {
        let paths = BookPaths::new(Path::new("/root"), "B123");
        assert_eq!(paths.temp_images, PathBuf::from("/root/temp_images/B123"));
        assert_eq!(paths.temp_files, PathBuf::from("/root/temp_files/B123"));
        assert_eq!(paths.collages, PathBuf::from("/root/collages/B123"));
        assert_eq!(paths.defect_map, PathBuf::from("/root/collages/B123_patches.xml"));
        assert_eq!(
            paths.coord_map(),
            PathBuf::from("/root/temp_images/B123/coord_map.xml")
        );
        assert_eq!(
            BookPaths::barcode_of(Path::new("/scans/B123")).as_deref(),
            Some("B123")
        );
    }

    #[test]
    fn test_worker_count_bounded() {
        let config = Config {
            max_cores: 10_000,
            ..Config::default()
        };
        assert!(config.worker_count() <= num_cpus::get().max(1));
        let config = Config {
            max_cores: 0,
            ..Config::default()
        };
        assert_eq!(config.worker_count(), 1);
    }
}
