//! Reusable RPC provider bases.
//!
//! A transport plugs its wire work into `ExportTransport` / `ImportTransport`;
//! the bases implement the `Exporter` / `Importer` contracts around it.

pub mod exporter;
pub mod importer;

pub use exporter::{ExportTransport, RpcServiceExporter};
pub use importer::{ImportTransport, RpcServiceImporter};
