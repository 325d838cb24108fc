//! Application services: session tokens, cached content access, contact
//! handling and the mail contract.

pub mod auth;
pub mod contact;
pub mod content;
pub mod error;
pub mod mail;
pub mod repos;
