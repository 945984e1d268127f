//! A crate for decoding certificates stored on Fortinet-style appliances.
//!
//! The appliance exposes its certificate stores through a JSON-RPC
//! management endpoint. [`rpc`] models that wire protocol as explicit serde
//! types; [`report`] decodes the PEM blob a query returns and renders a
//! human-readable report.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod report;
pub mod rpc;

pub use report::{CertReport, DecodeError, KeyUsageFlags};
pub use rpc::{CertRef, CertType, RpcError, Session};
