pub mod comm;
pub mod control_loop;

pub use comm::{CommandServer, DatagramHandler, LinkMonitor};
pub use control_loop::{run, ControlLoop, LoopTimer};
