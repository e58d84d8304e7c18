//! Lock marker storage for pushlock.
//!
//! Mutual exclusion between independent processes (CI jobs, possibly on
//! different machines) that share nothing but a checkout:
//! - Git-operation locks (`git-*` workflow names) in `.locks/git/`
//! - General workflow locks in `.locks/workflows/`
//!
//! # Lock Files
//!
//! One marker file per workflow name, `<workflow>.lock`. Markers are created
//! with **create_new** semantics (exclusive create), so only one process can
//! hold a given workflow at a time, and removed on release. They are never
//! edited in place. Each lock directory carries a `.gitignore` of `*` so
//! markers never show up as working-tree changes.
//!
//! # Lock Records
//!
//! Each marker contains a JSON [`LockRecord`]: workflow name, lock id, owner,
//! pid, acquisition time and declared ttl. A marker older than the caller's
//! ttl is stale and may be removed by anyone.

mod metadata;
mod store;
mod types;


// Re-export public API
pub use metadata::{LockRecord, generate_lock_id};
pub use store::{FsLockStore, LockStore};
pub use types::LockHandle;
