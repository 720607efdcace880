use crate::client::{ClassifierApi, ClientError};
use crate::models::HistoryEntry;

pub const HISTORY_FAILED_MESSAGE: &str =
    "Failed to load classification history. Please try again later.";

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryState {
    Loading,
    /// Entries in server order, possibly none.
    Loaded(Vec<HistoryEntry>),
    Failed(String),
}

impl HistoryState {
    pub fn is_empty(&self) -> bool {
        matches!(self, HistoryState::Loaded(entries) if entries.is_empty())
    }
}

pub struct HistoryWorkflow {
    state: HistoryState,
    error_kind: Option<&'static str>,
}

impl Default for HistoryWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryWorkflow {
    pub fn new() -> Self {
        Self {
            state: HistoryState::Loading,
            error_kind: None,
        }
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error_kind
    }

    pub fn resolve(&mut self, outcome: Result<Vec<HistoryEntry>, ClientError>) {
        self.error_kind = None;
        self.state = match outcome {
            Ok(entries) => HistoryState::Loaded(entries),
            Err(e) => {
                tracing::error!("Error fetching history: {}", e);
                self.error_kind = Some(e.kind());
                HistoryState::Failed(e.user_message_or(HISTORY_FAILED_MESSAGE))
            }
        };
    }

    pub async fn load<C>(&mut self, client: &C) -> &HistoryState
    where
        C: ClassifierApi + ?Sized,
    {
        self.state = HistoryState::Loading;
        let outcome = client.fetch_history().await;
        self.resolve(outcome);
        &self.state
    }
}
