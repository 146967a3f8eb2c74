//! WebSocket Gateway
//!
//! Real-time signaling over WebSocket connections.

pub mod dispatcher;
pub mod gateway;
pub mod handler;
pub mod messages;
pub mod session;

pub use gateway::{Gateway, OutboundFrame};
pub use handler::ws_handler;
pub use messages::{ClientEvent, ClientFrame};
pub use session::SessionState;
