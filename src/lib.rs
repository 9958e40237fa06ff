//! Tickvault: a time-series bucket store served over UDP.
//!
//! Clients send one JSON request per datagram to create typed buckets,
//! append records, run point, scan and aggregate reads, and open live
//! streams that receive every new record of the buckets they name.
//!
//! The storage and query engine lives in [`tickvault_core`]; this crate adds
//! the request model, the [`Dispatcher`], the UDP transport and
//! configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickvault::{CliArgs, Settings, UdpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new(&CliArgs::default())?;
//!     let server = UdpServer::bind(&settings.server).await?;
//!     println!("listening on {}", server.local_addr()?);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod transport;
pub mod tests;

pub use config::{CliArgs, Settings};
pub use dispatcher::{Dispatcher, Response};
pub use error::{DispatchError, ErrorResponse};
pub use request::{ActionType, Request};
pub use transport::{UdpPushSink, UdpServer};
