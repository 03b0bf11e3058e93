//! roomtag library: portable room-level indoor positioning engine.
//!
//! A BLE asset tag listens to fixed gateways, each announcing the room it
//! sits in, and reports the room of the nearest one. This crate holds all
//! discovery, sampling, filtering, selection and protocol logic with no
//! platform dependencies, testable on any host with `cargo test`. The ESP32
//! firmware binary is a thin consumer that provides the radio, timers and
//! output sinks behind the [`engine`] traits.
//!
//! Module layers:
//! - data path: `scanner` → `registry` → `collector` → `filter` → `selector`
//! - control: `engine`, `signal`, `config`
//! - output: `protocol`, `comm`, `display`
//! - constants: `defaults`, `board`

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod collector;
pub mod comm;
pub mod config;
pub mod defaults;
pub mod display;
pub mod engine;
pub mod filter;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod selector;
pub mod signal;
