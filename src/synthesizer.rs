use anyhow::{anyhow, Context, Result};

use crate::api_connection::connection::Provider;
use crate::api_connection::endpoints::{ChatCompletionRequest, ChatMessage};
use crate::retrieval::Candidate;

/// Returned without any model call when retrieval came back empty.
pub const NO_MATCH_MESSAGE: &str = "Désolé, je n'ai trouvé aucun produit correspondant.";

/// Grounding instruction: the model answers from the supplied products only,
/// in French, and falls back to a fixed refusal phrase.
pub const SYSTEM_PROMPT: &str = "You are a nutrition assistant.
Answer using ONLY the provided context.
Explain briefly how you found the answer.
If the answer is not in the context, say \"Je ne sais pas\".
Answer in French.";

/// Capability interface for the completion backend, so the pipeline logic is
/// testable without a live model endpoint.
#[allow(async_fn_in_trait)]
pub trait CompletionBackend {
    async fn complete(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<String>;
}

impl CompletionBackend for Provider {
    async fn complete(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(temperature),
            max_tokens: None,
        };
        let response = self
            .call_chat_completion(request)
            .await
            .context("Chat completion request failed")?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Completion response contained no choices"))?;
        Ok(choice.message.content)
    }
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    text.chars().take(budget).collect()
}

/// Context block sent to the model, one product per candidate, in candidate
/// order. Ingredient lists are capped at `char_budget` characters each.
pub fn render_context(candidates: &[Candidate], char_budget: usize) -> String {
    let mut context_text = String::new();
    for candidate in candidates {
        let record = &candidate.record;
        context_text.push_str(&format!(
            "\nProduit:\n- Nom: {}\n- Nutriscore: {}\n- Ingrédients: {}\n",
            record.product_name,
            record.nutriscore_grade,
            truncate_chars(&record.ingredients_text, char_budget)
        ));
    }
    context_text
}

/// Turns the reranked candidates plus the question into one completion call
/// and returns the model's text verbatim. No candidates means the canned
/// no-match answer, with no model call at all.
pub async fn synthesize<C: CompletionBackend>(
    backend: &C,
    query: &str,
    candidates: &[Candidate],
    temperature: f32,
    context_char_budget: usize,
) -> Result<String> {
    if candidates.is_empty() {
        return Ok(NO_MATCH_MESSAGE.to_string());
    }

    let context_text = render_context(candidates, context_char_budget);
    let user_message = format!("Context:\n{}\n\nQuestion: {}", context_text, query);

    let messages = vec![
        ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: user_message,
        },
    ];
    backend.complete(messages, temperature).await
}
