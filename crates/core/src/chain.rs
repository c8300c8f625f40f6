use crate::prompt::{format_documents, PromptTemplate};
use crate::traits::{ChatModel, DocumentRetriever, QuestionAnswering};
use crate::{ChainError, ChainInput, ChainOutput};
use async_trait::async_trait;
use tracing::debug;

pub struct RetrievalChain<R, M>
where
    R: DocumentRetriever,
    M: ChatModel,
{
    retriever: R,
    model: M,
    prompt: PromptTemplate,
}

impl<R, M> RetrievalChain<R, M>
where
    R: DocumentRetriever + Send + Sync,
    M: ChatModel + Send + Sync,
{
    pub fn new(retriever: R, model: M, prompt: PromptTemplate) -> Self {
        Self {
            retriever,
            model,
            prompt,
        }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn invoke(&self, input: ChainInput) -> Result<ChainOutput, ChainError> {
        let context = self.retriever.retrieve(&input.input).await?;
        debug!(retrieved = context.len(), "retrieved context");

        let prompt = self.prompt.render(&format_documents(&context), &input.input);
        let answer = self.model.invoke(&prompt).await?;

        Ok(ChainOutput {
            input: input.input,
            context,
            answer,
        })
    }
}

#[async_trait]
impl<R, M> QuestionAnswering for RetrievalChain<R, M>
where
    R: DocumentRetriever + Send + Sync,
    M: ChatModel + Send + Sync,
{
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput, ChainError> {
        RetrievalChain::invoke(self, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, IndexError, ModelError};
    use std::sync::Mutex;

    struct FakeRetriever {
        documents: Vec<Document>,
    }

    #[async_trait]
    impl DocumentRetriever for FakeRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, IndexError> {
            Ok(self.documents.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl DocumentRetriever for FailingRetriever {
        async fn retrieve(&self, query: &str) -> Result<Vec<Document>, IndexError> {
            Err(IndexError::NotFound(query.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
            if self.fail {
                return Err(ModelError::BackendResponse {
                    backend: "fake".to_string(),
                    status: 429,
                    details: "rate limited".to_string(),
                });
            }
            self.prompts
                .lock()
                .expect("prompt log lock")
                .push(prompt.to_string());
            Ok("Drink fluids and rest.".to_string())
        }
    }

    fn context() -> Vec<Document> {
        vec![
            Document::new("Influenza spreads through droplets."),
            Document::new("Treatment is rest and fluids."),
        ]
    }

    #[tokio::test]
    async fn chain_bundles_input_context_and_answer() {
        let chain = RetrievalChain::new(
            FakeRetriever {
                documents: context(),
            },
            RecordingModel::default(),
            PromptTemplate::default(),
        );

        let output = chain
            .invoke(ChainInput::new("How is flu treated?"))
            .await
            .expect("chain should succeed");

        assert_eq!(output.input, "How is flu treated?");
        assert_eq!(output.context, context());
        assert_eq!(output.answer, "Drink fluids and rest.");

        let prompts = chain.model().prompts.lock().expect("prompt log lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0]
            .contains("Influenza spreads through droplets.\n\nTreatment is rest and fluids."));
        assert!(prompts[0].contains("How is flu treated?"));
    }

    #[tokio::test]
    async fn every_call_reaches_the_model() {
        let chain = RetrievalChain::new(
            FakeRetriever {
                documents: context(),
            },
            RecordingModel::default(),
            PromptTemplate::default(),
        );

        for _ in 0..2 {
            chain
                .invoke(ChainInput::new("same question"))
                .await
                .expect("chain should succeed");
        }

        assert_eq!(chain.model().prompts.lock().expect("prompt log lock").len(), 2);
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_before_generation() {
        let chain = RetrievalChain::new(
            FailingRetriever,
            RecordingModel::default(),
            PromptTemplate::default(),
        );

        let result = chain.invoke(ChainInput::new("anything")).await;
        assert!(matches!(result, Err(ChainError::Retrieval(_))));
        assert!(chain.model().prompts.lock().expect("prompt log lock").is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates_unchanged() {
        let chain = RetrievalChain::new(
            FakeRetriever {
                documents: context(),
            },
            RecordingModel {
                fail: true,
                ..RecordingModel::default()
            },
            PromptTemplate::default(),
        );

        let result = chain.invoke(ChainInput::new("anything")).await;
        assert!(matches!(
            result,
            Err(ChainError::Generation(ModelError::BackendResponse { status: 429, .. }))
        ));
    }

    #[tokio::test]
    async fn empty_question_still_runs_the_chain() {
        let chain = RetrievalChain::new(
            FakeRetriever {
                documents: context(),
            },
            RecordingModel::default(),
            PromptTemplate::default(),
        );

        let output = chain
            .invoke(ChainInput::new(""))
            .await
            .expect("empty input is answered like any other");
        assert_eq!(output.input, "");
        assert_eq!(output.context.len(), context().len());
        assert_eq!(chain.model().prompts.lock().expect("prompt log lock").len(), 1);
    }
}
