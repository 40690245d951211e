//! Context policy
//!
//! Maps request paths to the realm, acceptable authentication types and
//! required attributes that protect them. Flat [`PolicyEntry`] values are
//! grouped into [`ContextPolicyBin`]s; [`ContextPolicyEngine`] resolves a
//! path to a bin, the whitelist, or nothing.

mod bin;
mod engine;
mod error;
mod store;

pub use bin::{
    ContextPolicyBin, PolicyEntry, RequiredAttributes, group_entries,
    has_same_required_attributes, normalize_path,
};
pub use engine::{ContextPolicyEngine, PolicySnapshot, Resolution};
pub use error::{PolicyError, Result};
pub use store::{CommitReport, ConfigStore, FileConfigStore, MemoryConfigStore, PolicyProperties};
