//! Request/response plumbing to the data store.

pub mod connection;
pub mod memory;

pub use self::connection::RedisTransport;
pub use self::memory::MemoryTransport;

use crate::error::Result;
use crate::reply::Reply;

/// Sends one command and waits for its reply.
///
/// Implementations own connection setup and timeouts. Errors are returned
/// as-is; nothing above this layer retries.
pub trait Transport {
    fn send_command(&mut self, name: &str, args: &[String]) -> Result<Reply>;

    /// Whether commands are routed across a cluster rather than one node.
    fn is_cluster(&self) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_command(&mut self, name: &str, args: &[String]) -> Result<Reply> {
        (**self).send_command(name, args)
    }

    fn is_cluster(&self) -> bool {
        (**self).is_cluster()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_command(&mut self, name: &str, args: &[String]) -> Result<Reply> {
        (**self).send_command(name, args)
    }

    fn is_cluster(&self) -> bool {
        (**self).is_cluster()
    }
}
