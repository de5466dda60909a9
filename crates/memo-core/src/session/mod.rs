//! Session lifecycle.
//!
//! A session's document-store record and its vector collection are created
//! and destroyed together:
//!
//! ```text
//! create_session
//!   │
//!   ├─► insert session record (canonical)
//!   │
//!   └─► ensure collection ──✗──► IndexNotReady (record kept, retry ensure)
//!
//! update_session
//!   │
//!   └─► rewrite name/tags ──0──► NotFound (collection untouched)
//!
//! delete_session
//!   │
//!   ├─► delete session record ──0──► NotFound
//!   │
//!   ├─► cascade memory records ──✗──► warn (orphans)
//!   │
//!   └─► delete collection ──✗──► OrphanedCollection
//! ```

mod lifecycle;

pub use lifecycle::*;
