//! # asset-curator
//!
//! An incremental asset dependency and transform-state engine for editor tooling.
//!
//! ## Overview
//!
//! asset-curator indexes every file below a project's data directories, recognizes asset sources
//! through pluggable type handlers and keeps, for each asset, an up-to-date answer to one
//! question: *does the transformed output still match its inputs?* It does so without rebuilding
//! anything itself. Handlers report what an asset depends on; the curator hashes the transitive
//! closure of those inputs and compares the result with the hash the handler recorded when it last
//! produced the output.
//!
//! ### Key Features
//!
//! - **Incremental invalidation**: inverse dependency tables map every referenced file to the
//!   assets that use it, so a changed texture only touches the meshes that declare it
//! - **Dependencies vs. references**: transform-time inputs feed the asset hash, runtime
//!   references only the thumbnail hash
//! - **Stale-result protection**: per-asset generation counters drop results computed against an
//!   index state that changed in the meantime
//! - **Background updates**: a small worker pool drains stale assets, open assets first
//! - **Persistent scan cache**: unchanged files are not re-read on the next start
//! - **Asset lookup tables**: per data directory and platform profile, for the runtime loader
//!
//! ## Architecture
//!
//! - **[`index`]**: the authoritative store (`AssetIndex`): file entries, asset records in an
//!   arena, sub-asset views and the inverse tables
//! - **[`hashing`]**: transitive hull walk and asset/thumbnail hash folding
//! - **[`curator`]**: the `Curator` context, scanner, state machine and processing front-end
//! - **[`scheduler`]**: background update workers
//! - **[`handler`]**: the `AssetTypeHandler` contract and its registry
//! - **[`cache`]** and **[`asset_table`]**: persisted artifacts
//! - **[`event`]**: change notifications
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asset_curator::{
//!     config::CuratorConfig, curator::Curator, handler::HandlerRegistry,
//!     properties::TransformState,
//! };
//! use std::time::Duration;
//!
//! let config = CuratorConfig::new(&["/project/Assets"]).with_worker_count(2);
//! let curator = Curator::new(config, HandlerRegistry::create())?;
//! curator.initialize()?;
//!
//! // Background workers compute states (and transform, with `auto_transform`).
//! curator.wait_for_updates(Duration::from_secs(30));
//!
//! let stats = curator.get_asset_transform_stats();
//! println!("{} assets up to date", stats[&TransformState::UpToDate]);
//! # Ok::<(), asset_curator::CuratorError>(())
//! ```
//!
//! ## Writing a Handler
//!
//! ```rust
//! use asset_curator::{
//!     handler::{AssetContext, AssetHeader, AssetTypeHandler, TransformOutput, TransformRequest},
//!     properties::AssetId,
//!     CuratorError,
//! };
//! use std::path::Path;
//!
//! struct TextureHandler;
//!
//! impl AssetTypeHandler for TextureHandler {
//!     fn type_name(&self) -> &str {
//!         "Texture"
//!     }
//!
//!     fn extensions(&self) -> Vec<String> {
//!         vec!["png".to_string()]
//!     }
//!
//!     fn parse_header(&self, _path: &Path, rel: &str) -> Result<AssetHeader, CuratorError> {
//!         Ok(AssetHeader::new(AssetId::from_relative_path(rel), "Texture"))
//!     }
//!
//!     fn recorded_output_hash(&self, _ctx: &AssetContext<'_>) -> Option<u64> {
//!         None
//!     }
//!
//!     fn transform(&self, _request: &TransformRequest<'_>) -> Result<TransformOutput, CuratorError> {
//!         Ok(TransformOutput::default())
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: index, hashing, state machine, scheduler, caches
//! - **service**: debounced directory watching (`notify`)

pub mod asset_table;
pub mod cache;
pub mod config;
pub mod curator;
pub mod error;
pub mod event;
pub mod graph;
pub mod handler;
pub mod hash;
pub mod hashing;
pub mod index;
pub mod paths;
pub mod properties;
pub mod scheduler;
#[cfg(test)]
mod tests;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
