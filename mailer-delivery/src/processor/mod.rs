//! The supervisor, poller and dispatcher loops.
//!
//! One [`ConnectionSupervisor`] runs for the life of the daemon. While it
//! holds a live session it runs the [`MessagePoller`] on it synchronously;
//! the poller in turn spawns one [`Dispatcher`] task per delivery.

mod dispatch;
mod poller;
mod supervisor;

pub use dispatch::Dispatcher;
pub use poller::{MessagePoller, PollerExit, PollerSettings, PollerStats};
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorExit};
