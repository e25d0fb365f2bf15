//! Writing values into detected controls.

pub mod coerce;
pub mod custom_dropdown;
pub mod native_select;
pub mod orchestrator;

pub use custom_dropdown::OptionMatcher;
pub use orchestrator::{FillOrchestrator, FillOutcome, FillReporter, SharedPage};
