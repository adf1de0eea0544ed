//! Internal plumbing between the transport and the public API.

pub mod line_parser;
pub mod stream;
