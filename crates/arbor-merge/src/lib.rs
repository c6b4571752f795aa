//! Automatic merging of divergent versions.
//!
//! The merger combines two versions by *intent replay*: each concurrent
//! version's operations are re-expressed as position-independent intents
//! against that version's own base tree, then replayed in causal order on
//! top of the common ancestor's tree. Each intent resolves itself against
//! the tree as it currently stands, so concurrent structural changes
//! (vanished parents, shifted sibling positions, deleted targets) degrade
//! gracefully instead of failing the merge.

pub mod error;
pub mod intent;
pub mod merger;

pub use error::{MergeError, MergeResult};
pub use intent::{capture_intents, Intent};
pub use merger::VersionMerger;
