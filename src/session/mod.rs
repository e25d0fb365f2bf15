//! Per-page context and the request protocol spoken to it.

pub mod messaging;
pub mod notify;
pub mod page_analysis;
pub mod page_session;

pub use messaging::{handle_message, Request, UNKNOWN_ACTION};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use page_session::{Collaborators, PageContext, PageSession, DETECT_FIRST_MESSAGE};
