pub mod sync;
pub mod transition;

pub use sync::item_updater::{ItemUpdater, UpdateItemInput};
pub use transition::integrity::IntegrityVerifier;
pub use transition::migrator::RevisionMigrator;
pub use transition::scheduler::{ScheduleOutcome, TransitionScheduler};
pub use transition::status_events::apply_status_update;
