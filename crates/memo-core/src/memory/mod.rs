//! Memory coordination across the vector index and the document store.
//!
//! ## Ingestion
//!
//! ```text
//! add_memories(session, batch)
//!   │
//!   ├─► collection present?          ──no──► NotFound
//!   ├─► embed whole batch (1 call)   ──✗───► Provider, nothing written
//!   ├─► score importance (optional)  ──✗───► Parse/Provider, nothing written
//!   ├─► upsert points, wait=true     ──✗───► Index, nothing written
//!   └─► insert records (dual-write)  ──✗───► Store, points stay (orphans)
//! ```
//!
//! ## Retrieval
//!
//! Search and scroll return points in index order. Under the dual-write
//! topology the content is joined from the document store and the index
//! order is restored; points with no record are dropped and counted.

mod coordinator;
mod ingest;
mod join;
mod scroll;
mod search;

pub use coordinator::MemoryCoordinator;
pub use scroll::MemoryPage;
pub use search::{SearchHits, SearchOptions};
