//! ChartFeed Core: incremental historical-bar loading for chart surfaces.
//!
//! This crate contains the bar window manager:
//! - Domain types (bars, timeframes, fills)
//! - Range fetcher contract with REST and in-memory sources
//! - Gap-skipping retry loop over empty history chunks
//! - Bar merge and de-duplication into an ascending window
//! - Loaded-window state machine with stale-result detection
//! - Marker aligner snapping fills onto loaded bars
//! - Debounce primitive, symbol reference cache and TOML configuration

pub mod config;
pub mod data;
pub mod debounce;
pub mod domain;
pub mod markers;
pub mod session;
pub mod window;
