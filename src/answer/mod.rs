// Answer composition module
// Grounded prompt construction and the completion capability

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;

/// Produces text from a system prompt and a user prompt
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

// Shared by the reply constant and the persona, which must quote it verbatim
macro_rules! insufficient_context_reply {
    () => {
        "В предоставленном руководстве нет информации по этому вопросу"
    };
}

/// Reply the model is told to give when the context lacks the answer
pub const INSUFFICIENT_CONTEXT_REPLY: &str = insufficient_context_reply!();

/// Fixed instruction persona sent as the system prompt
pub const SYSTEM_PROMPT: &str = concat!(
    "Ты - автомобильный ассистент, который отвечает на вопросы по руководству по эксплуатации автомобиля.

ПРАВИЛА:
1. Отвечай ТОЛЬКО на русском языке.
2. Используй ТОЛЬКО информацию из предоставленного контекста.
3. Если в контексте недостаточно информации, прямо скажи: \"",
    insufficient_context_reply!(),
    "\".
4. Будь технически точным: сохраняй числа, единицы измерения и названия систем как в руководстве.
5. Форматируй ответ четко и понятно, при необходимости используй нумерованные шаги."
);

/// Build the user prompt from the question and a rendered context block
#[inline]
pub fn user_prompt(query: &str, context_block: &str) -> String {
    format!(
        "Вопрос: {}\n\nКонтекст из руководства по эксплуатации:\n{}\n\nСформулируй полный и точный ответ на русском языке, используя ТОЛЬКО предоставленную информацию.",
        query, context_block
    )
}

/// Asks the completion capability for an answer grounded in retrieved context
#[derive(Clone)]
pub struct AnswerComposer {
    completer: Arc<dyn Completer>,
}

impl AnswerComposer {
    #[inline]
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer }
    }

    /// One completion call, no retries; the reply is trimmed
    #[inline]
    pub async fn compose(&self, query: &str, context_block: &str) -> Result<String> {
        let prompt = user_prompt(query, context_block);
        debug!("Composing answer from {} chars of context", context_block.len());

        let answer = self.completer.complete(SYSTEM_PROMPT, &prompt).await?;
        Ok(answer.trim().to_string())
    }
}
