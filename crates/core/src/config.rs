//! Configuration loading for Curricula training and serving
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! `config/curricula.{toml,yaml,json}` file, a `.env` file, and environment
//! variables prefixed with `CURRICULA__` (double underscore separates
//! sections, e.g. `CURRICULA__KG__EMBEDDING_DIM=32`).
//!
//! # Example
//!
//! ```no_run
//! use curricula_core::config::CurriculaConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! curricula_core::config::load_dotenv();
//! let config = CurriculaConfig::load(None)?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{CurriculaError, Result};
use crate::observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "config/curricula";
const ENV_PREFIX: &str = "CURRICULA";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CurriculaConfig {
    pub data: DataConfig,
    pub models: ModelsConfig,
    pub training: TrainingConfig,
    pub kg: KnowledgeGraphConfig,
    pub cf: CollaborativeConfig,
    pub hybrid: HybridConfig,
    pub server: ServerConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `courses.csv` and `courses_taken.csv`
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory trained artifacts are written to and loaded from
    pub models_dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Pass threshold used for graph edges, interactions and fusion pairs
    /// (default: 11.0)
    pub pass_threshold: f32,
    /// RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 11.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KnowledgeGraphConfig {
    /// Node embedding dimensionality (default: 64)
    pub embedding_dim: usize,
    /// Maximum nodes per random walk (default: 30)
    pub walk_length: usize,
    /// Walk rounds over every node (default: 200)
    pub num_walks: usize,
}

impl Default for KnowledgeGraphConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            walk_length: 30,
            num_walks: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaborativeConfig {
    /// Latent factors (default: 64)
    pub factors: usize,
    /// ALS iterations (default: 15)
    pub iterations: usize,
    /// Ridge regularization lambda (default: 0.01)
    pub regularization: f32,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            factors: 64,
            iterations: 15,
            regularization: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HybridConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Server port (default: 5000)
    pub port: u16,
    /// Worker threads; actix default when absent
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            workers: None,
        }
    }
}

impl CurriculaConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// `path` overrides the default `config/curricula` file stem. A missing
    /// file is not an error; a present but unparsable one is.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| CurriculaError::ConfigurationError {
                message: format!("Failed to read configuration: {}", e),
                key: None,
            })?;

        settings
            .try_deserialize()
            .map_err(|e| CurriculaError::ConfigurationError {
                message: format!("Failed to deserialize configuration: {}", e),
                key: None,
            })
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=20.0).contains(&self.training.pass_threshold) {
            return Err(CurriculaError::config(
                format!(
                    "pass_threshold must be within 0-20, got {}",
                    self.training.pass_threshold
                ),
                "CURRICULA__TRAINING__PASS_THRESHOLD",
            ));
        }

        if self.kg.embedding_dim == 0 {
            return Err(CurriculaError::config(
                "embedding_dim must be greater than 0",
                "CURRICULA__KG__EMBEDDING_DIM",
            ));
        }

        if self.kg.walk_length == 0 {
            return Err(CurriculaError::config(
                "walk_length must be greater than 0",
                "CURRICULA__KG__WALK_LENGTH",
            ));
        }

        if self.cf.factors == 0 {
            return Err(CurriculaError::config(
                "factors must be greater than 0",
                "CURRICULA__CF__FACTORS",
            ));
        }

        // The normal equations are only guaranteed positive definite with lambda > 0
        if self.cf.regularization <= 0.0 {
            return Err(CurriculaError::config(
                "regularization must be greater than 0",
                "CURRICULA__CF__REGULARIZATION",
            ));
        }

        if self.hybrid.batch_size < 2 {
            return Err(CurriculaError::config(
                format!(
                    "batch_size must be at least 2 for batch normalization, got {}",
                    self.hybrid.batch_size
                ),
                "CURRICULA__HYBRID__BATCH_SIZE",
            ));
        }

        if self.hybrid.learning_rate <= 0.0 {
            return Err(CurriculaError::config(
                "learning_rate must be greater than 0",
                "CURRICULA__HYBRID__LEARNING_RATE",
            ));
        }

        if self.server.port == 0 {
            return Err(CurriculaError::config(
                "port must be greater than 0",
                "CURRICULA__SERVER__PORT",
            ));
        }

        self.logging.validate()
    }
}

/// Load .env file if present
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CurriculaConfig::default();
        assert_eq!(config.training.pass_threshold, 11.0);
        assert_eq!(config.kg.embedding_dim, 64);
        assert_eq!(config.kg.walk_length, 30);
        assert_eq!(config.kg.num_walks, 200);
        assert_eq!(config.cf.factors, 64);
        assert_eq!(config.cf.iterations, 15);
        assert_eq!(config.hybrid.batch_size, 32);
        assert_eq!(config.server.port, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curricula.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[kg]\nembedding_dim = 16\n\n[training]\nseed = 7").unwrap();

        let stem = dir.path().join("curricula");
        let config = CurriculaConfig::load(Some(stem.to_str().unwrap())).unwrap();

        assert_eq!(config.kg.embedding_dim, 16);
        assert_eq!(config.kg.walk_length, 30);
        assert_eq!(config.training.seed, Some(7));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CurriculaConfig::load(Some("/nonexistent/curricula")).unwrap();
        assert_eq!(config.cf.factors, 64);
    }

    #[test]
    fn test_validation_rejects_small_batch() {
        let mut config = CurriculaConfig::default();
        config.hybrid.batch_size = 1;

        match config.validate().unwrap_err() {
            CurriculaError::ConfigurationError { key, .. } => {
                assert_eq!(key.as_deref(), Some("CURRICULA__HYBRID__BATCH_SIZE"));
            }
            other => panic!("Expected ConfigurationError, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_out_of_range_threshold() {
        let mut config = CurriculaConfig::default();
        config.training.pass_threshold = 25.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_regularization() {
        let mut config = CurriculaConfig::default();
        config.cf.regularization = 0.0;
        assert!(config.validate().is_err());
    }
}
