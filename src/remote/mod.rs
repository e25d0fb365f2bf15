//! Optional collaborators: the HTTP analysis service and its duplex channel.

pub mod channel;
pub mod client;
pub mod types;

pub use channel::{DuplexChannel, InboundMessage, OutboundMessage};
pub use client::{Assistant, FormAnalyzer, RemoteAnalysisClient};
pub use types::{AnalysisOutcome, RemotePlan};
