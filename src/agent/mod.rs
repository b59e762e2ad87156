// Agent module: the schedule evaluation loop
//
// The loop polls the schedule document for new versions, installs decoded
// schedules into the shared store, evaluates the store every cycle and
// announces the blocked set whenever it changes.

mod change;
mod daemon;
pub(crate) mod loader;
pub mod shutdown;
mod store;

pub use change::{ChangeDetector, Observation};
pub use daemon::SchedulerLoop;
pub use loader::{FileScheduleSource, LoadOutcome, ScheduleLoader, ScheduleSource};
pub use shutdown::{Shutdown, watch_signals};
pub use store::ScheduleStore;
