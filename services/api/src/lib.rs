//! Receptionist API Library Crate
//!
//! This library contains everything the `api` binary wires together: the
//! environment configuration, public URL resolution (explicit or tunneled),
//! the per-call config manager, the events manager, and the Twilio-facing
//! telephony router. The binary is a thin wrapper around this library.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod config_manager;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod state;
pub mod tunnel;
