//! Wire encoding capabilities for outbound requests and inbound responses.
//!
//! `request` defines [`RequestSerializer`], which turns a parameter mapping into the body
//! or query of a transport request. `response` defines [`ResponseSerializer`], which turns
//! a raw response into either a typed value or a structured server error, and reports a
//! [`ResponseParseError`](crate::error::ResponseParseError) only for bodies it cannot read.
//! Both are pure transformations and never perform I/O.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
