//! Page-level state machines. Each workflow owns its state exclusively and
//! talks to the classification service only through [`crate::client::ClassifierApi`].

pub mod history;
pub mod results;
pub mod upload;

pub use history::{HistoryState, HistoryWorkflow};
pub use results::{ResultsRequest, ResultsState, ResultsWorkflow};
pub use upload::{PreviewState, Selection, UploadOutcome, UploadState, UploadWorkflow};
