//! RUES: HTTP subscribe/unsubscribe plus a single WebSocket for event delivery.

pub mod dispatch;
pub mod frame;
pub mod registry;
pub mod session;
pub mod target;
pub mod types;

pub use dispatch::{ByteStream, HttpDispatch, ReqwestDispatch};
pub use session::RuesSession;
pub use target::{Subscription, Target};
pub use types::*;
