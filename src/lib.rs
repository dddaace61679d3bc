//! wallet-relay - development proxy for the Wallet Provider API
//!
//! Relays local HTTP requests to a Wallet Provider, adding the user
//! identifier and application key headers the production backend would add
//! for an authenticated user.

pub mod cli;
pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
