//! Metadata cache for remote API responses
//!
//! Release listings, directory listings and commit metadata are cached in one
//! JSON document per kind under the cache root, each kind with its own TTL.
//!
//! # Module Organization
//!
//! - [`config`] - Cache root and per-kind lifetimes
//! - [`clock`] - Injectable time source
//! - [`store`] - The cache store itself
//!
//! # Examples
//!
//! ```rust,no_run
//! use release_fetcher::app::cache::{CacheConfig, CacheKind, CacheStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CacheStore::new("/tmp/release-cache", CacheConfig::default());
//! store.put(CacheKind::Releases, "meshtastic/firmware", serde_json::json!([])).await?;
//!
//! if let Some(lookup) = store.get(CacheKind::Releases, "meshtastic/firmware").await {
//!     println!("fresh: {}", lookup.is_fresh);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use store::{CacheEntry, CacheKind, CacheLookup, CacheStore};
