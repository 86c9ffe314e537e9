//! ragcheck-state: persistence layer for the ragcheck evaluation engine
//!
//! This crate owns the record schema and the storage contract the engine
//! writes through. It knows nothing about metrics or runners.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: atomic dataset creation, tenant isolation, write-once results.
//!
//! ## Key Components
//!
//! - `EvalStore`: async, tenant-scoped store contract
//! - `MemoryEvalStore`: in-memory implementation of the contract
//! - `DatasetRecord` / `DatasetItemRecord` / `TaskRecord` / `ResultRecord`: rows

mod error;
pub mod fakes;
mod schema;
pub mod storage_traits;

pub use error::{InvalidTransition, StorageError};
pub use fakes::MemoryEvalStore;
pub use schema::{
    items_digest, DatasetId, DatasetItemRecord, DatasetRecord, DatasetSource, ItemError,
    ItemErrorKind, ItemId, MetricScores, ResultId, ResultRecord, TaskId, TaskRecord, TaskStatus,
    TenantId,
};
pub use storage_traits::{EvalStore, StorageResult};
