//! Core domain + application logic for the voice-to-text bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, the recognition
//! providers and the relational store live behind ports (traits) implemented
//! in adapter crates.

pub mod actions;
pub mod analytics;
pub mod button;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod health;
pub mod language;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod payment;
pub mod ports;
pub mod prefix;
pub mod splitter;
pub mod store;
pub mod text;
pub mod uptime;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
