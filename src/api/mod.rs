//! Purpose: Define the public Rust API boundary for dynamite.
//! Exports: Client, pagers, HTTP transport, config, and the value types they use.
//! Role: Public, additive-only surface over the core conversion modules.
//! Invariants: Callers reach the store only through an `Execute` implementation.

mod batch_get;
mod batch_write;
mod client;
mod config;
mod remote;
mod scan;
mod sign;
#[cfg(test)]
mod testing;

pub use crate::core::attr::{WireAttribute, WireItem};
pub use crate::core::convert::ConversionOptions;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::set::{SetType, TypedSet};
pub use crate::core::value::{Item, NativeValue, item_from, item_json};
pub use batch_get::{BatchGetPager, BatchGetResult, MAX_GET_PAGE_SIZE};
pub use batch_write::{BatchWritePager, BatchWriteSummary, DEFAULT_PAGE_SIZE, MAX_WRITE_PAGE_SIZE};
pub use client::{
    ApiResult, BatchGetPage, Client, Execute, KeysAndAttributes, Operation, Pending, WriteRequest,
};
pub use config::{ClientConfig, Credentials, ENDPOINT_VAR};
pub use remote::HttpTransport;
pub use scan::{ScanAggregator, ScanResult};
pub use sign::{SignedHeaders, sign_request};
