//! Flatline OpenAlex - flatten OpenAlex snapshot entities into csv.gz tables
//!
//! This crate registers the projections for works, authors and funders and
//! maps each entity onto its output files. The streaming itself is done by
//! `flatline-core`.
//!
//! # Example
//!
//! ```no_run
//! use flatline_core::{CancelToken, ProgressContext};
//! use flatline_openalex::{Config, Entity, run};
//!
//! let config = Config {
//!     entity: Entity::Works,
//!     snapshot_dir: "/data/openalex-snapshot".into(),
//!     ..Default::default()
//! };
//!
//! let summary = run(&config, CancelToken::new(), &ProgressContext::new())
//!     .expect("Pipeline failed");
//! println!("Wrote {} rows", summary.rows_written());
//! ```

pub mod config;
pub mod entity;
pub mod runner;
pub mod schema;
pub mod transform;

// Re-exports for convenience
pub use config::Config;
pub use entity::Entity;
pub use runner::{pipeline_config, run};
