//! Wakegate - a reverse proxy that wakes its backend on demand
//!
//! This library provides a wake-and-forward gateway that:
//! - Sends a Wake-on-LAN magic packet for every inbound request
//! - Probes the backend with a short TCP connect to decide how to respond
//! - Transparently forwards requests when the backend is reachable
//! - Serves a self-refreshing interstitial page while the backend boots
//! - Streams request and response bodies without buffering

pub mod config;
pub mod error;
pub mod gateway;
pub mod interstitial;
pub mod probe;
pub mod upstream;
pub mod wake;
