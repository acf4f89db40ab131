//! Capability traits for the store under test.
//!
//! The store itself is an external collaborator. Traffic generation only ever
//! talks to it through [`KvClient`], and obtains clients through a
//! [`Connector`].

mod traits;

pub use traits::{Connector, KvClient, SharedKvClient};
