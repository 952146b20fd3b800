pub mod coordinator;
pub mod retry;

pub use coordinator::{PollCoordinator, PollSettings, Scheduler};
pub use retry::RetryPolicy;
