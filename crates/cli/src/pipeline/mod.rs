//! Controller simulation, shutdown handling and run statistics.

mod controller;
mod shutdown;
mod stats;

pub use controller::PseudoController;
pub use shutdown::shutdown_signal;
pub use stats::{ReceiveStats, ServeStats, SinkSummary};
