//! Finding and classifying form fields on a page.

pub mod context;
pub mod detector;
pub mod locate;
pub mod taxonomy;
pub mod types;
pub mod watcher;

pub use context::{element_context, ElementContext};
pub use detector::{FieldDetector, INPUT_SELECTOR, NO_FORM_MESSAGE};
pub use locate::Located;
pub use types::{
    AnalysisSource, DetectionResult, ElementType, FieldDescriptor, FillInstruction, FillTarget,
    FillValue, FormScope, FormType,
};
pub use watcher::MutationWatcher;
