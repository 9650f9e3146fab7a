//! Purpose: Library crate backing the `dynamite` CLI and its tests.
//! Exports: `api` (client, pagers, transport, config) and `core` (values, conversion, errors).
//! Role: Native-value adapter over the DynamoDB JSON protocol.
//! Invariants: Only `core::convert` moves values between native and wire form.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
