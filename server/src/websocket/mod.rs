//! WebSocket change feed.
//!
//! Clients connect with their session token and receive a `changed` message
//! for every record of their clinic that the store creates, updates or
//! deletes. A change of kind `reloaded` means the whole state was swapped and
//! clients should refetch.

mod handler;
mod manager;
mod protocol;

pub use handler::ws_handler;
pub use manager::ConnectionManager;
pub use protocol::*;
