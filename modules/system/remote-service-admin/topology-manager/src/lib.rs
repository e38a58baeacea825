//! RSA Topology Manager
//!
//! Policy layer on top of `remote-service-admin`:
//! - exports local services that declare `service.exported.interfaces` as they
//!   register, updates their exports on modification and closes them on
//!   unregistration
//! - forwards export registrations and unregistrations to endpoint advertisers
//! - hands endpoints discovered elsewhere to a pluggable [`ImportPolicy`]

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod config;
pub mod manager;
pub mod policy;

pub use config::TopologyManagerConfig;
pub use manager::TopologyManager;
pub use policy::{AutoImportPolicy, ImportPolicy, LoggingImportPolicy};
