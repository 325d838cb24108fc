//! Consumer side of the JSON API.
//!
//! [`PortfolioClient`] reads the public endpoints through a [`ClientCache`]
//! using stale-while-revalidate, so pages render from memory while a
//! background task keeps the cached copy current.

mod api;
mod cache;
mod revalidate;

pub use api::{ClientError, PortfolioClient};
pub use cache::ClientCache;
pub use revalidate::{Revalidated, stale_while_revalidate};
