use crate::client::{ClassifierApi, ClientError};
use crate::models::{ClassificationRecord, ModelSelector};

pub const RESULTS_FAILED_MESSAGE: &str =
    "Failed to load classification results. Please try again later.";

#[derive(Debug, Clone, PartialEq)]
pub enum ResultsState {
    Loading,
    Loaded(ClassificationRecord),
    /// The service has no record for this identifier.
    Empty,
    Failed(String),
}

/// One issued fetch. Only the most recently issued request may update state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsRequest {
    generation: u64,
    pub identifier: String,
    pub model: ModelSelector,
}

impl ResultsRequest {
    pub async fn send<C>(&self, client: &C) -> Result<ClassificationRecord, ClientError>
    where
        C: ClassifierApi + ?Sized,
    {
        client.fetch_results(&self.identifier, self.model).await
    }
}

pub struct ResultsWorkflow {
    identifier: String,
    model: ModelSelector,
    generation: u64,
    state: ResultsState,
    error_kind: Option<&'static str>,
}

impl ResultsWorkflow {
    pub fn new(identifier: impl Into<String>, model: ModelSelector) -> Self {
        Self {
            identifier: identifier.into(),
            model,
            generation: 0,
            state: ResultsState::Loading,
            error_kind: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn model(&self) -> ModelSelector {
        self.model
    }

    pub fn state(&self) -> &ResultsState {
        &self.state
    }

    /// [`ClientError::kind`] of the failure behind a `Failed` state.
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error_kind
    }

    /// Enters `Loading` and issues a request for the current identifier and model.
    pub fn begin(&mut self) -> ResultsRequest {
        self.generation += 1;
        self.state = ResultsState::Loading;
        ResultsRequest {
            generation: self.generation,
            identifier: self.identifier.clone(),
            model: self.model,
        }
    }

    pub fn set_model(&mut self, model: ModelSelector) -> ResultsRequest {
        self.model = model;
        self.begin()
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) -> ResultsRequest {
        self.identifier = identifier.into();
        self.begin()
    }

    /// Applies the response to `request`. Returns `false` when a newer request
    /// has been issued since, in which case the response is dropped.
    pub fn resolve(
        &mut self,
        request: &ResultsRequest,
        outcome: Result<ClassificationRecord, ClientError>,
    ) -> bool {
        if request.generation != self.generation
            || request.identifier != self.identifier
            || request.model != self.model
        {
            tracing::debug!(
                "Discarding stale results for {} ({})",
                request.identifier,
                request.model
            );
            return false;
        }

        self.error_kind = None;
        self.state = match outcome {
            Ok(record) => ResultsState::Loaded(record),
            Err(ClientError::NotFound(_)) => ResultsState::Empty,
            Err(e) => {
                tracing::error!("Error fetching results: {}", e);
                self.error_kind = Some(e.kind());
                ResultsState::Failed(e.user_message_or(RESULTS_FAILED_MESSAGE))
            }
        };
        true
    }

    pub async fn load<C>(&mut self, client: &C) -> &ResultsState
    where
        C: ClassifierApi + ?Sized,
    {
        let request = self.begin();
        let outcome = request.send(client).await;
        self.resolve(&request, outcome);
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ProgressSender, Submission};
    use crate::models::{HistoryEntry, ScoredLabel, SelectedImage};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeApi {
        records: HashMap<(String, ModelSelector), Vec<ScoredLabel>>,
        failure: Option<u16>,
    }

    #[async_trait]
    impl ClassifierApi for FakeApi {
        async fn submit(
            &self,
            _image: &SelectedImage,
            _model: ModelSelector,
            _on_progress: Option<ProgressSender>,
        ) -> Result<Submission, ClientError> {
            unimplemented!()
        }

        async fn fetch_results(
            &self,
            identifier: &str,
            model: ModelSelector,
        ) -> Result<ClassificationRecord, ClientError> {
            if let Some(status_code) = self.failure {
                return Err(ClientError::Service {
                    status_code,
                    detail: None,
                });
            }
            self.records
                .get(&(identifier.to_string(), model))
                .map(|results| ClassificationRecord {
                    identifier: identifier.to_string(),
                    results: results.clone(),
                    timestamp: None,
                })
                .ok_or_else(|| ClientError::NotFound(identifier.to_string()))
        }

        async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
            unimplemented!()
        }
    }

    fn record(label: &str, confidence: f64) -> ClassificationRecord {
        ClassificationRecord {
            identifier: "abc.jpg".into(),
            results: vec![ScoredLabel {
                label: label.into(),
                confidence,
            }],
            timestamp: None,
        }
    }

    #[test]
    fn test_only_latest_selector_response_is_rendered() {
        let mut workflow = ResultsWorkflow::new("abc.jpg", ModelSelector::FruitClassifier);
        let initial = workflow.begin();
        assert!(workflow.resolve(&initial, Ok(record("apple", 0.9))));

        let to_mobilenet = workflow.set_model(ModelSelector::MobilenetV2);
        let back_to_fruit = workflow.set_model(ModelSelector::FruitClassifier);
        assert_eq!(workflow.state(), &ResultsState::Loading);

        // The newer request resolves first, then the older one arrives late.
        assert!(workflow.resolve(&back_to_fruit, Ok(record("banana", 0.8))));
        assert!(!workflow.resolve(&to_mobilenet, Ok(record("granny smith", 0.7))));

        assert_eq!(workflow.state(), &ResultsState::Loaded(record("banana", 0.8)));
        assert_eq!(workflow.model(), ModelSelector::FruitClassifier);
    }

    #[test]
    fn test_stale_failure_does_not_replace_loading_state() {
        let mut workflow = ResultsWorkflow::new("abc.jpg", ModelSelector::FruitClassifier);
        let first = workflow.begin();
        let second = workflow.set_identifier("def.jpg");

        assert!(!workflow.resolve(&first, Err(ClientError::Timeout)));
        assert_eq!(workflow.state(), &ResultsState::Loading);
        assert_eq!(second.identifier, "def.jpg");
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_empty_not_failed() {
        let api = FakeApi {
            records: HashMap::new(),
            failure: None,
        };
        let mut workflow = ResultsWorkflow::new("missing.jpg", ModelSelector::FruitClassifier);
        assert_eq!(workflow.load(&api).await, &ResultsState::Empty);
    }

    #[tokio::test]
    async fn test_model_change_refetches_for_new_selector() {
        let mut records = HashMap::new();
        records.insert(
            ("abc.jpg".to_string(), ModelSelector::FruitClassifier),
            vec![ScoredLabel {
                label: "apple".into(),
                confidence: 0.95,
            }],
        );
        records.insert(
            ("abc.jpg".to_string(), ModelSelector::MobilenetV2),
            vec![ScoredLabel {
                label: "Granny Smith".into(),
                confidence: 0.61,
            }],
        );
        let api = FakeApi {
            records,
            failure: None,
        };

        let mut workflow = ResultsWorkflow::new("abc.jpg", ModelSelector::FruitClassifier);
        workflow.load(&api).await;
        let request = workflow.set_model(ModelSelector::MobilenetV2);
        let outcome = request.send(&api).await;
        workflow.resolve(&request, outcome);

        match workflow.state() {
            ResultsState::Loaded(record) => assert_eq!(record.results[0].label, "Granny Smith"),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_service_failure_shows_message() {
        let api = FakeApi {
            records: HashMap::new(),
            failure: Some(500),
        };
        let mut workflow = ResultsWorkflow::new("abc.jpg", ModelSelector::FruitClassifier);
        assert_eq!(
            workflow.load(&api).await,
            &ResultsState::Failed(RESULTS_FAILED_MESSAGE.to_string())
        );
        assert_eq!(workflow.error_kind(), Some("service"));
    }

    #[test]
    fn test_error_kind_follows_latest_outcome() {
        let mut workflow = ResultsWorkflow::new("abc.jpg", ModelSelector::FruitClassifier);
        let request = workflow.begin();
        workflow.resolve(&request, Err(ClientError::Timeout));
        assert_eq!(workflow.error_kind(), Some("timeout"));

        let request = workflow.begin();
        workflow.resolve(&request, Ok(record("apple", 0.9)));
        assert_eq!(workflow.error_kind(), None);
    }
}
