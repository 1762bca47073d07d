//! Sync client for the server's patch feed
//!
//! Keeps the local mirror current by subscribing to one or more patch
//! sources and applying whatever they emit.
//!
//! ## Flow
//!
//! 1. Restore the persisted snapshot into the store
//! 2. Subscribe to every configured source, merged into one stream
//! 3. Apply each batch; the store enforces revision ordering
//! 4. Debounce bursts into one Connected notification and one persisted
//!    snapshot
//!
//! ## Usage
//!
//! ```ignore
//! let source = Arc::new(WebSocketSource::new("ws://server:5959/db"));
//! let mut client = PatchSyncClient::init(vec![source], Bootstrapper::new(&config));
//! client.start();
//! ```

mod client;
mod source;
mod ws;

pub use client::{ConnectionStatus, PatchSyncClient, SyncEvent, SyncWatcher};
pub use source::{Source, SourceError, SourceStream};
pub use ws::WebSocketSource;
