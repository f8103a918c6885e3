//! HTTP transport for the transfer engine.
//!
//! [`HttpTransferApi`] talks to the remote transfer REST API with `reqwest`:
//! multipart for payloads and chunks, JSON for session control.

mod client;

pub use client::HttpTransferApi;
