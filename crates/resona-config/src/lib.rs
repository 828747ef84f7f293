//! Configuration management for resona synthesis engines.
//!
//! An [`EngineConfig`] is a TOML file naming one engine, an optional preset,
//! global render settings and per-engine tables that override individual
//! preset values. Loading validates every field and reports a typed
//! [`ConfigError`]; the runtime parameter structs it builds stay
//! clamp-on-write.
//!
//! # Example
//!
//! ```rust
//! use resona_config::{EngineConfig, EngineKind};
//!
//! let cfg = EngineConfig::from_toml_str(
//!     r#"
//!     engine = "physical"
//!     preset = "marimba"
//!     polyphony = 6
//!
//!     [physical]
//!     ring_time = 2.5
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(cfg.engine, EngineKind::Physical);
//! let params = cfg.physical_params().unwrap();
//! assert_eq!(params.ring_time(), 2.5);
//! ```

mod engine_config;
mod error;

/// Per-engine override tables.
pub mod sections;

pub use engine_config::{EngineConfig, EngineKind, MAX_BLOCK_SIZE, SAMPLE_RATE_RANGE};
pub use error::ConfigError;
pub use sections::{
    AdditiveSection, EnvelopeSection, FmSection, GranularSection, PhysicalSection, VectorSection,
};
