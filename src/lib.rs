//! mzrds - Redis CLI with saved connection profiles and cursor-based SCAN traversal
//!
//! # Example
//!
//! ```
//! use mzrds::{MemoryTransport, ScanItem, ScanOptions, ScanTarget, Scanner, Decoded};
//!
//! let mut store = MemoryTransport::new();
//! store.set("user:1", "ada");
//! store.set("order:1", "x");
//!
//! // Walk every page of SCAN MATCH user:*
//! let keys: Vec<ScanItem> = Scanner::new(&mut store, ScanTarget::Keyspace)
//!     .unwrap()
//!     .traverse(ScanOptions::new("user:*", 10))
//!     .collect::<mzrds::Result<_>>()
//!     .unwrap();
//! assert_eq!(keys, vec![ScanItem::Key(Decoded::Text("user:1".into()))]);
//! ```

pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod pager;
pub mod render;
pub mod reply;
pub mod scan;
pub mod session;
pub mod transport;

pub use config::{ConnectionOptions, ConnectionOverrides, ProfileStore};
pub use decode::{decode_bytes, Decode, Decoded};
pub use error::{ClientError, Result};
pub use pager::{fetch_all, fetch_one_page, FetchPage, ScanItem, ScanIter, ScanOptions, ScanPage};
pub use reply::Reply;
pub use scan::{ScanRequest, ScanTarget, Scanner, Traversal};
pub use session::{Connector, RedisConnector, Session};
pub use transport::{MemoryTransport, RedisTransport, Transport};
