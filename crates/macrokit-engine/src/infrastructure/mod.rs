//! Adapters to the outside world: OS input hooks, the hardware relay
//! device, hotkey registration, input injection, key-name translation,
//! and configuration files.

pub mod config;
pub mod hotkey;
pub mod inject;
pub mod rdev_map;
pub mod source;
