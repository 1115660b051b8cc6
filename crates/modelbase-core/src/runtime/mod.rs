//! Load-time half: governance, indexing, selection, publication.
//!
//! - [`config`]: `LoadConfig` (allow / deny / prefer / custom)
//! - [`filter`]: `Rules` and the compiled allow/deny predicate
//! - [`snapshot`]: the filtered, indexed `Snapshot`
//! - [`query`]: lookup, capability predicates, `select` / `candidates`
//! - [`store`]: `Catalog`, the versioned published state

pub mod config;
pub mod filter;
pub mod query;
pub mod snapshot;
pub mod store;

pub use config::LoadConfig;
pub use filter::{Axis, CompiledFilter, FilterConfig, FilterWarning, ProviderRules, Rules};
pub use query::{Capability, Predicate, SelectQuery};
pub use snapshot::{Snapshot, SnapshotMeta};
pub use store::{Catalog, LoadOutcome, Published};
