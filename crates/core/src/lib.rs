//! The core engine crate for Gridbook.
//!
//! This crate hosts the pieces that sit on either side of the worker
//! boundary: the wire protocol and dispatcher which drive a long-lived
//! compute kernel, the workbook model and formula tooling the reference
//! kernel is built on, and the version stores which persist workbook
//! snapshots, including the streaming backend that writes chunked
//! snapshots into a shared replicated document.
#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod cnf;
pub mod err;
pub mod exe;
pub mod rdc;
pub mod rpc;
pub mod syn;
pub mod vrs;
pub mod wbk;
