//! Where's My Device - Rust SMS remote-command daemon
//!
//! Lets an owner locate, ring and control a lost device by texting it
//! password-protected commands from another phone.

pub mod access;
pub mod alert;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod platform;
pub mod processor;
pub mod responder;
pub mod settings;
pub mod whitelist;

pub use error::{Error, Result};
