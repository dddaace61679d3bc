//! TCP front end: accepts connections and hands each one to an HTTP
//! connection task.

pub mod listener;

use crate::config::Config;
use crate::http::request::Method;
use crate::proxy::{ForwardError, Forwarder};

/// Read-only state shared by every connection.
#[derive(Debug)]
pub struct AppState {
    pub forwarder: Forwarder,
    pub allowed_methods: Vec<Method>,
}

impl AppState {
    pub fn new(forwarder: Forwarder, allowed_methods: Vec<Method>) -> Self {
        Self {
            forwarder,
            allowed_methods,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ForwardError> {
        let forwarder = Forwarder::new(config.upstream.clone())?;
        Ok(Self::new(forwarder, config.allowed_methods.clone()))
    }
}
