pub mod envelope;
pub mod hub;

pub use envelope::{PushEnvelope, PushEnvelopeType};
pub use hub::{ConnectionHandle, FinalResult, PushChannelHub};
