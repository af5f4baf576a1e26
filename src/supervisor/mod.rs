//! Supervisor side: launch a worker and talk to it.
//!
//! # Architecture
//!
//! ```text
//! SupervisorClient                          worker process
//!     |-- spawn ------------------------------->|
//!     |<-- WORKER_READY | SERVICE_PORT:n (stderr)|
//!     |-- Request (stdin line | POST /rpc) ---->|
//!     |<-- Response (stdout line | body) -------|
//!     |-- close stdin | SIGTERM --------------->|
//! ```

mod client;
mod error;
mod http_transport;
mod process;
mod side_channel;
mod state;
mod transport;

pub use client::*;
pub use error::ClientError;
pub use http_transport::HttpTransport;
pub use process::{SpawnError, WorkerCommand, WorkerProcess};
pub use side_channel::{Diagnostics, SideChannelReader, SideEvent, DIAGNOSTIC_LINES};
pub use state::{ClientState, ClientStateMachine, ClientStats};
pub use transport::{StdioTransport, Transport};
