//! Grade-driven review scheduling with streaks, levels and badges.

pub mod config;
pub mod db;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;
pub mod schedule;

pub use config::{CadenceConfig, ConfigError};
pub use db::Database;
pub use engine::{Engine, GradeOutcome};
pub use error::{EngineError, PersistenceError, ValidationError};
pub use gateway::PersistenceGateway;
