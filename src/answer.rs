//! Grounded answer composition.
//!
//! Turns retrieved chunks into a prompt, calls the generator, and packages
//! the result with sources and a confidence score. [`AnswerComposer::answer`]
//! never fails: every failure mode maps to a fixed fallback text naming the
//! configured contact.

use std::sync::Arc;

use crate::config::AnswerConfig;
use crate::error::RagError;
use crate::generation::{GenerationParams, GenerationProvider};
use crate::models::{Answer, AnswerStatus, RetrievedChunk, SourceRef};

pub struct AnswerComposer {
    generator: Arc<dyn GenerationProvider>,
    config: AnswerConfig,
    params: GenerationParams,
}

impl AnswerComposer {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        config: AnswerConfig,
        params: GenerationParams,
    ) -> Self {
        Self {
            generator,
            config,
            params,
        }
    }

    /// Answer `question` from `retrieved`, falling back instead of failing.
    pub async fn answer(&self, question: &str, retrieved: &[RetrievedChunk]) -> Answer {
        match self.compose(question, retrieved).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed; returning fallback");
                self.unavailable(AnswerStatus::GenerationUnavailable, retrieved.len())
            }
        }
    }

    /// Like [`answer`](Self::answer) but surfaces generation failures,
    /// including a blank model response, as
    /// [`RagError::GenerationUnavailable`].
    pub async fn compose(
        &self,
        question: &str,
        retrieved: &[RetrievedChunk],
    ) -> Result<Answer, RagError> {
        if retrieved.is_empty() {
            return Ok(self.no_information());
        }

        let prompt = self.build_prompt(question, retrieved);
        let text = self
            .generator
            .generate(&prompt, &self.params)
            .await
            .map_err(|e| RagError::GenerationUnavailable(format!("{:#}", e)))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::GenerationUnavailable(
                "model returned an empty answer".to_string(),
            ));
        }

        Ok(Answer {
            answer: text.to_string(),
            sources: self.sources(retrieved),
            confidence: mean_similarity(retrieved),
            retrieved_chunk_count: retrieved.len(),
            status: AnswerStatus::Answered,
        })
    }

    /// The fixed reply when nothing relevant was retrieved.
    pub fn no_information(&self) -> Answer {
        Answer {
            answer: format!(
                "I don't have specific information about that topic in my knowledge base. \
                 Please contact {} for detailed information.",
                self.config.fallback_contact
            ),
            sources: Vec::new(),
            confidence: 0.0,
            retrieved_chunk_count: 0,
            status: AnswerStatus::NoContext,
        }
    }

    /// The apology returned when a service in the pipeline failed.
    pub fn unavailable(&self, status: AnswerStatus, retrieved_chunk_count: usize) -> Answer {
        let activity = match status {
            AnswerStatus::EmbeddingUnavailable | AnswerStatus::RetrievalFailed => {
                "searching my knowledge base"
            }
            _ => "generating a response",
        };
        Answer {
            answer: format!(
                "I apologize, but I'm having trouble {} right now. \
                 Please try again or contact {} for immediate assistance.",
                activity, self.config.fallback_contact
            ),
            sources: Vec::new(),
            confidence: 0.0,
            retrieved_chunk_count,
            status,
        }
    }

    pub fn build_prompt(&self, question: &str, retrieved: &[RetrievedChunk]) -> String {
        let (role, subject) = match &self.config.organization {
            Some(org) => (
                format!(
                    "You are {}, a helpful assistant for {}.",
                    self.config.assistant_name, org
                ),
                format!("the user's question about {}", org),
            ),
            None => (
                format!("You are {}, a helpful assistant.", self.config.assistant_name),
                "the user's question".to_string(),
            ),
        };

        format!(
            "{role}\n\
             Use the following context information to answer {subject}.\n\
             \n\
             CONTEXT:\n\
             {context}\n\
             \n\
             USER QUESTION: {question}\n\
             \n\
             INSTRUCTIONS:\n\
             - Answer only from the context above. Do not invent facts.\n\
             - If the context does not fully answer the question, say what information is available and suggest contacting {contact}.\n\
             - Copy fees, dates, counts, and other factual details exactly as they appear in the context.\n\
             - Be friendly, professional, and concise.\n\
             \n\
             ANSWER:",
            role = role,
            subject = subject,
            context = build_context(retrieved),
            question = question.trim(),
            contact = self.config.fallback_contact,
        )
    }

    fn sources(&self, retrieved: &[RetrievedChunk]) -> Vec<SourceRef> {
        let mut sources: Vec<SourceRef> = Vec::new();
        for chunk in retrieved.iter().take(self.config.max_sources) {
            let source = SourceRef {
                title: chunk.metadata.title.clone(),
                source_url: chunk.metadata.source_url.clone(),
                similarity: chunk.similarity_score,
            };
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources
    }
}

/// One `Source: ... / Content: ...` block per chunk, separated by `---`.
pub fn build_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .map(|chunk| {
            let label = match &chunk.metadata.section_label {
                Some(section) => format!("{} / {}", chunk.metadata.title, section),
                None => chunk.metadata.title.clone(),
            };
            format!(
                "Source: {} (Relevance: {:.3})\nContent: {}\n",
                label, chunk.similarity_score, chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn mean_similarity(retrieved: &[RetrievedChunk]) -> f32 {
    if retrieved.is_empty() {
        return 0.0;
    }
    retrieved.iter().map(|c| c.similarity_score).sum::<f32>() / retrieved.len() as f32
}
