//! Streaming generation calls against the model backend.

pub mod cancel;
pub mod client;
pub mod events;
pub mod retry;
pub mod stream;

pub use cancel::CancellationToken;
pub use client::{Capability, Generation, GenerationClient, is_step_complete};
pub use events::{StreamEvent, parse_record};
pub use retry::{Delay, RetryPolicy, TokioDelay, with_retry};
pub use stream::{consume, deltas};
