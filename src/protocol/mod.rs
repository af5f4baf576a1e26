//! Wire protocol shared by the worker and the supervisor.
//!
//! # Protocol
//!
//! Each request and response is one JSON object. On the line transport
//! it is written as a single line; on the HTTP transport it is the body
//! of `POST /rpc`.
//!
//! ```text
//! Supervisor                                   Worker
//!     |-- {"id":1,"operation":"setPin",...} ---->|
//!     |<-- {"id":1,"result":{...}} --------------|
//!     |-- {"id":2,"operation":"bogus"} --------->|
//!     |<-- {"id":2,"error":{"code":..,...}} -----|
//! ```
//!
//! Readiness is signalled out of band with [`Marker`] lines on stderr.

mod handler;
mod marker;
mod results;
mod tools;
mod types;

pub use handler::*;
pub use marker::*;
pub use results::*;
pub use tools::*;
pub use types::*;
