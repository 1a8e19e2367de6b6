//! Question/SQL similarity history
//!
//! A persistent nearest-neighbor index over previously accepted
//! (question, SQL) pairs. The workflow reads it for few-shot hints and
//! writes accepted translations back through it; the audit and teach
//! operations expose it directly.

use thiserror::Error;

mod embed;
mod record;
mod store;

pub use embed::{Embedder, OpenAiEmbedder};
pub use record::{HistoryRecord, NewRecord, RecordOrigin};
pub use store::{HistoryStore, Neighbor};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("History store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("No history record with id {0}")]
    UnknownId(String),
}
