//! # sockjs-core
//!
//! Transport-independent core of a SockJS server.
//!
//! - **Frames**: `o`, `a[...]`, `c[code,"reason"]`, `h` and their per-transport wrapping
//! - **Escaping**: the JSON string subset used inside array and close frames
//! - **Relay conduit**: bounded byte channel between a synchronous frame writer
//!   and an asynchronously drained response body
//! - **Sender**: transport-bound output channel, single-shot or continuous
//! - **Session**: `Connecting → Open → Closing → Closed` state machine with an
//!   outbound FIFO queue and at most one attached sender
//! - **Registry**: session lookup/creation, heartbeat ticks and idle sweeps

#![deny(unsafe_code)]

pub mod conduit;
pub mod errors;
pub mod escape;
pub mod frame;
pub mod ids;
pub mod metric_names;
pub mod registry;
pub mod sender;
pub mod service;
pub mod session;

pub use conduit::{ConduitReader, ConduitWriter, conduit};
pub use errors::{AttachError, ConduitError, EscapeError, FrameError, SendError, SessionError};
pub use frame::{CloseFrame, Frame, Wrapping, close_code};
pub use ids::{SenderId, SessionId};
pub use registry::{RegistryConfig, SessionRegistry, SweepReport};
pub use sender::{Completion, Delivery, Sender};
pub use service::SessionService;
pub use session::{Session, SessionEvent, SessionState};
