//! Reverse proxy functionality
//!
//! This module implements the relay itself: rewriting inbound requests for
//! the Wallet Provider, sending them, and filtering what comes back.

pub mod forwarder;

pub use forwarder::{
    APP_KEY_HEADER, EXCLUDED_RESPONSE_HEADERS, ForwardError, Forwarder, OutboundRequest,
    USER_ID_HEADER, UpstreamResponse, prepare, relay_response, upstream_url,
};
