pub mod connection;
pub mod head;
pub mod headers;

pub use connection::{Connection, ConnectionEvent, ConnectionHandle, Inspection};
pub use headers::Headers;
