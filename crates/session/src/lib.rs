//! Per-call orchestration
//!
//! One task per call. Call-control events, RTP frames, recognizer callbacks,
//! synthesis chunks and timer expirations all funnel into a single inbox; the
//! session task is the sole writer of session state and guarantees teardown
//! on every exit path.

mod call;
mod context;
mod event;
mod registry;
mod state;

pub use call::CallSession;
pub use context::SessionContext;
pub use event::{CallEvent, SessionEvent};
pub use registry::{dispatch_event, SessionRegistry};
pub use state::CallState;
