pub mod cli;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod failover;
pub mod protocol;
pub mod query;

pub use client::{Client, EndpointStatus};
pub use config::ClientConfig;
pub use endpoint::EndpointAddr;
pub use error::{Error, Result};
pub use protocol::{AttributeUpdate, ExcerptOptions, ResultSet, request::UpdateValues};
pub use query::{QueryBuilder, QueryDescriptor};
