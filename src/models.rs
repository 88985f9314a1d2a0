pub mod files;
pub mod followup;
pub mod identity;
pub mod profile;
pub mod schedule;

pub use files::AttachmentFile;
pub use followup::{FollowUpRecord, ServiceRecord};
pub use identity::{FilterInfo, MatchStrategy, Resolution, SearchMode};
pub use profile::{ContactInfo, MemberProfile};
pub use schedule::{MaintenanceSummary, TaskRecord};
