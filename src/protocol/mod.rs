// Protocol module: request routing for the schedule resources
//
// Requests name a destination; the routing table maps it onto one of the
// schedule endpoints and the dispatcher performs the operation and builds
// the reply. On Unix the running agent accepts requests as JSON lines on a
// local socket.

mod dispatcher;
mod message;
pub mod routes;
#[cfg(unix)]
pub mod server;
mod wire;

pub use dispatcher::{Handled, ProtocolDispatcher};
pub use message::{MessageKind, RequestMessage};
pub use wire::{WireRequest, WireResponse};
