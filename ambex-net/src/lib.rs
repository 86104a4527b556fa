pub mod channel;
pub mod codec;
pub mod message;

pub use channel::{HeadsetEndpoint, OperatorEndpoint, channel_pair};
pub use codec::{WireError, decode, encode, wire_options};
pub use message::{FromHeadset, SessionStage, SessionSummary, ToHeadset};
