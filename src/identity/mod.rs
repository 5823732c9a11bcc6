pub mod cooldown;
pub mod models;
pub mod registry;
pub mod session;
pub mod store;

pub use cooldown::CooldownTracker;
pub use models::{is_valid_id, normalize_id, ExternalAccountId, IdentityRecord};
pub use registry::{IdentityRegistry, RegisteredUser, RegistrySnapshot};
pub use session::{SessionManager, SessionReply, SubmissionKind};
pub use store::{JsonFileStore, MemoryStore, RegistryStore};
