//! Portfolio website backend: JSON API over a document store with an admin
//! session, request throttling and read-through caching.

pub mod application;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod infra;
