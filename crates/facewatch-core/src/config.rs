use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read from the working directory when `FACEWATCH_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "facewatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration: defaults, then `facewatch.toml`, then `FACEWATCH_*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Enrollment file.
    pub store_path: PathBuf,
    /// Directory for daily recognition logs.
    pub log_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub match_threshold: f32,
    /// Capture loop pacing target.
    pub target_fps: u32,
    /// TrueType font for name labels; system fonts are tried when unset.
    pub label_font: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            model_dir: default_model_dir(),
            store_path: PathBuf::from("known_faces.json"),
            log_dir: PathBuf::from("."),
            match_threshold: 0.40,
            target_fps: 30,
            label_font: None,
        }
    }
}

impl Config {
    /// Load the config file named by `FACEWATCH_CONFIG` (or `facewatch.toml`
    /// if present) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("FACEWATCH_CONFIG").ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let base = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env())
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `FACEWATCH_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse().ok());
        Self {
            camera_device: lookup("FACEWATCH_CAMERA_DEVICE").unwrap_or(self.camera_device),
            capture_width: parsed("FACEWATCH_CAPTURE_WIDTH").unwrap_or(self.capture_width),
            capture_height: parsed("FACEWATCH_CAPTURE_HEIGHT").unwrap_or(self.capture_height),
            model_dir: lookup("FACEWATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.model_dir),
            store_path: lookup("FACEWATCH_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(self.store_path),
            log_dir: lookup("FACEWATCH_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.log_dir),
            match_threshold: lookup("FACEWATCH_MATCH_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.match_threshold),
            target_fps: parsed("FACEWATCH_TARGET_FPS")
                .unwrap_or(self.target_fps)
                .max(1),
            label_font: lookup("FACEWATCH_LABEL_FONT")
                .map(PathBuf::from)
                .or(self.label_font),
        }
    }

    /// Target wall-clock time per capture iteration.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

/// `$XDG_DATA_HOME/facewatch/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch")
        .join("models")
}
