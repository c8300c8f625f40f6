use crate::error::PromptError;
use crate::models::Document;

const CONTEXT_PLACEHOLDER: &str = "{context}";
const INPUT_PLACEHOLDER: &str = "{input}";

pub const DEFAULT_TEMPLATE: &str = "\
You are a helpful Medical AI assistant. Answer questions based on the provided context.

CONTEXT:
{context}

QUESTION:
{input}

INSTRUCTIONS:
1. Use only information from the context
2. If context doesn't contain answer, say \"I don't know\"
3. Keep answer concise (2-3 sentences)
4. Use simple language

ANSWER:
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn from_template(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        if !template.contains(CONTEXT_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder("context"));
        }
        if !template.contains(INPUT_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder("input"));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    // single pass: braces inside context or question are never re-expanded
    pub fn render(&self, context: &str, input: &str) -> String {
        let mut rendered = String::with_capacity(self.template.len() + context.len() + input.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(INPUT_PLACEHOLDER) {
                rendered.push_str(input);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|document| document.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
