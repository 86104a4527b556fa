pub mod clock;
pub mod scheduler;
pub mod sleep;

pub use clock::{Clock, MonotonicClock, VirtualClock};
pub use scheduler::Scheduler;
pub use sleep::precise_sleep;
