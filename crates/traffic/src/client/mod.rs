//! Clients for the store under test.

mod recording;

pub use recording::RecordingClient;
