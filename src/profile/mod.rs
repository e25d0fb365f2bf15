pub mod store;
pub mod types;

pub use store::{profile_or_first_run, settings_or_default, JsonFileStore, MemoryStore, ProfileStore};
pub use types::{ProfileField, ProfileValue, Settings, UserProfile};
