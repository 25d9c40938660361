//! Curated re-exports for the common use cases.

pub use crate::ds::node::Handle;
pub use crate::error::{ConfigError, TraceError};
pub use crate::ghost::{
    AccessMode, CurvePoint, GhostCache, GhostKvCache, GhostKvMeta, SampledGhostCache,
    SampledGhostKvCache,
};
pub use crate::hash::{GHash, IdHash, KeyHash, MurmurHash, XxHash32};
pub use crate::lru::LruCache;
pub use crate::shared::{SharedCache, TenantView};
pub use crate::stat::CacheStat;
pub use crate::workload::{KeyGenerator, Workload, WorkloadSpec};
