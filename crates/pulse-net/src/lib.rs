pub mod client;
pub mod config;
pub mod error;
pub mod loopback;
pub mod transport;

pub use client::*;
pub use config::*;
pub use error::*;
pub use loopback::*;
pub use transport::*;
