//! Inbound frame parsing and normalization
//!
//! Turns raw upstream JSON frames into canonical [`TickerRecord`]s, or
//! classifies them as control replies for the connection manager.

mod normalize;
mod types;

pub use normalize::{parse_frame, ControlReply, Inbound};
pub use types::TickerRecord;
