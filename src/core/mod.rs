pub mod engine;
pub mod executor;
pub mod inspector;
pub mod model;
pub mod planner;
pub mod progress;
pub mod scanner;
pub mod summary;

pub use engine::{normalize_remote_root, SyncEngine};
pub use executor::{ActionRecord, Outcome, TransferExecutor};
pub use inspector::RemoteInspector;
pub use model::{EntryKind, FileEntry, RelPath, SkippedEntry, TreeInventory};
pub use planner::{plan, plan_with, ActionSummary, PlanOptions, SkipReason, SyncAction, SyncPlan};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressReporter, ProgressSender};
pub use scanner::{resolve_local_root, LocalScanner};
pub use summary::SyncSummary;
