//! Relay lifecycle.
//!
//! - `state` - lifecycle state machine (Idle, WaitingForGatewayReady,
//!   Running, Stopping, Stopped)
//! - `shutdown` - cooperative stop signal shared with the gateway
//! - `scheduler` - readiness wait and the poll-cycle loop

pub mod scheduler;
pub mod shutdown;
pub mod state;

pub use scheduler::{CycleReport, RelayScheduler};
pub use shutdown::ShutdownHandle;
pub use state::RelayState;
