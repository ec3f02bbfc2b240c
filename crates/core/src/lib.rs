//! # Curricula Core
//!
//! Shared building blocks for the Curricula course recommender.
//!
//! ## Modules
//!
//! - `catalog`: Courses, grade history and derived student views
//! - `loader`: CSV catalog loading
//! - `validation`: Data consistency report
//! - `analytics`: Course and student statistics
//! - `config`: Configuration loading and validation
//! - `error`: Error types and handling
//! - `observability`: Structured logging setup

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod error;
pub mod loader;
pub mod observability;
pub mod validation;

// Re-export commonly used types
pub use catalog::{
    Catalog, CatalogProvider, Course, CycleEntry, HistoryRecord, StudentHistory,
    DEFAULT_PASS_THRESHOLD,
};
pub use config::{load_dotenv, CurriculaConfig};
pub use error::{CurriculaError, Result};
pub use loader::CsvCatalogLoader;
pub use observability::{init_logging, LogConfig, LogFormat};
pub use validation::ValidationReport;
