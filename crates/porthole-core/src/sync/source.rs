//! Upstream patch sources
//!
//! A source is an external producer of patch batches: the live push channel,
//! a long-poll fallback, anything that can emit [`PatchBatch`] values in
//! order. The sync client merges every configured source into one stream and
//! applies whatever arrives; ordering conflicts are the store's to reject.

use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::patch::PatchBatch;

/// Errors terminating a source's stream
#[derive(Error, Debug)]
pub enum SourceError {
    /// The underlying transport failed
    #[error("transport failure: {0}")]
    Transport(String),

    /// The source produced a message that does not decode as a patch batch
    #[error("undecodable message from source: {0}")]
    Decode(String),
}

/// The stream of batches produced by one subscription
pub type SourceStream = BoxStream<'static, Result<PatchBatch, SourceError>>;

/// An upstream producer of patch batches
///
/// Each call to `subscribe` opens an independent, non-restartable stream
/// (for a network source: a fresh connection). The stream is expected to be
/// infinite; completion is abnormal and an `Err` item is terminal.
pub trait Source: Send + Sync {
    fn subscribe(&self) -> SourceStream;
}
