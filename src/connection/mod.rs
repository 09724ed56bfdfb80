//! Connection Engines
//!
//! Two interchangeable ways of serving clients over the same
//! [`Session`] contract:
//!
//! ```text
//!                       ┌───────────────┐
//!                       │  TcpListener  │
//!                       └───────┬───────┘
//!              ┌────────────────┴────────────────┐
//!              ▼                                 ▼
//!   ┌─────────────────────┐           ┌─────────────────────┐
//!   │   ThreadedServer    │           │       Reactor       │
//!   │ task per connection │           │ one task, readiness │
//!   │ Arc<Mutex<Store>>   │           │ owned Store         │
//!   │ ExpirySweeper task  │           │ cron in event loop  │
//!   └──────────┬──────────┘           └──────────┬──────────┘
//!              └────────────────┬────────────────┘
//!                               ▼
//!                  Session::respond(chunk, store)
//! ```
//!
//! - `session`: decode, evaluate, reply; connection statistics
//! - `threaded`: one task per client over a shared, locked store
//! - `reactor`: a single task multiplexing every client by read readiness

pub mod reactor;
pub mod session;
pub mod threaded;

pub use reactor::Reactor;
pub use session::{ActiveConnection, ConnectionError, ConnectionStats, Session};
pub use threaded::{handle_connection, serve_stream, ThreadedServer};
