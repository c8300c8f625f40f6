use crate::{ChainError, ChainInput, ChainOutput, Document, IndexError, ModelError};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, IndexError>;
}

#[async_trait]
pub trait ChatModel {
    fn model_name(&self) -> &str;

    async fn invoke(&self, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
pub trait QuestionAnswering: Send + Sync {
    async fn invoke(&self, input: ChainInput) -> Result<ChainOutput, ChainError>;
}
