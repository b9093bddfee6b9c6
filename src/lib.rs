//! # weir
//!
//! Harvests social-media feeds and the web resources they link to into WARC
//! capture files, following links only as deep as configured and remembering
//! across runs what it has already seen.
//!
//! ## Architecture
//!
//! ```text
//! seeds → Queue → Strategy → fetch → Writer
//!           ↑                  │
//!           └── discovered ────┘
//! ```
//!
//! A streaming session is a second entry point: it captures a kept-open
//! connection in segments and leaves the files for a later harvest to mine.
//!
//! ## Quick Start
//!
//! ```bash
//! # Harvest every [[seeds]] entry
//! weir harvest
//!
//! # See what would be fetched without writing anything
//! weir harvest --dry-run
//!
//! # Capture a configured stream until Ctrl-C
//! weir stream garden
//!
//! # Show stored watermarks
//! weir state
//! ```

/// Application context, client cache and error types.
pub mod app;

/// Capture records and the WARC container they are written to.
pub mod capture;

/// Command-line interface using clap.
///
/// - `harvest [--dry-run] [--full]`
/// - `stream <name>`
/// - `state`
pub mod cli;

/// Configuration loaded from `~/.config/weir/config.toml`.
pub mod config;

/// Fetchable items, the resource type lattice and seeds.
pub mod domain;

/// HTTP clients and the debug-trace reconstructor.
pub mod fetcher;

/// The harvest loop, its queue and the fetch strategy.
pub mod harvest;

/// Built-in item kinds: timelines, blogs, stream replays and web resources.
pub mod sources;

/// Incremental harvest state (watermarks) with JSON and SQLite backends.
pub mod store;

/// Segmented capture of long-lived streaming connections.
pub mod stream;
