//! PaperScope client core
//!
//! The aggregation-and-search layer between the paper/entity backend and a
//! presentation surface. Raw occurrence records flow through the transport
//! client into the entity index builder; the search engine filters the
//! resulting index; the store coordinates mutations and keeps the visible
//! projection consistent with the backend.
//!
//! ```text
//! transport -> raw records -> index -> search -> presentation
//!                 ^                                   |
//!                 +---------- mutations <-------------+
//! ```

pub mod index;
pub mod search;
pub mod store;
pub mod transport;

// Re-export the facade types consumers need
pub use index::{EntityIndex, IndexEntry, OccurrenceLink, PaperOccurrence};
pub use search::{EntityQuery, SearchMode, SearchResults};
pub use store::Store;
pub use transport::{Backend, HttpBackend};
