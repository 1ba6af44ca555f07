//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `feeds`: Order event ingestion (JSON Lines)
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: Atomic JSON ledger snapshots

pub mod feeds;
pub mod metrics;
pub mod persistence;
