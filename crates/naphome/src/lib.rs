//! Naphome: a voice assistant demo board runtime.
//!
//! The binary wires these modules together; see [`runtime::run`].

pub mod cli;
pub mod cloud;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod github;
pub mod http_api;
pub mod led;
pub mod mdns;
pub mod player;
pub mod runtime;
pub mod sensors;
pub mod status;
pub mod tasks;
pub mod voice;
