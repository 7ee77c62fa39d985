pub mod assertions;
pub mod logging;
pub mod scheduler;

pub use assertions::assert_contains;
pub use logging::init_test_logging;
pub use scheduler::{CountingScheduler, OpenPool};
