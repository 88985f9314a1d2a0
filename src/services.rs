pub mod dates;
pub mod identity;
pub mod profile;
pub mod records;
pub mod schedule;

pub use identity::IdentityService;
pub use profile::ProfileService;
pub use records::RecordService;
pub use schedule::ScheduleService;
