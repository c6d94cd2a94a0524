use super::*;
use crate::ManualError;
use crate::testing::{FailingCompleter, ScriptedCompleter};

#[tokio::test]
async fn compose_sends_persona_and_grounded_prompt() {
    let completer = Arc::new(ScriptedCompleter::new("Каждые 10000 км."));
    let composer = AnswerComposer::new(completer.clone());

    let answer = composer
        .compose("когда менять масло", "БЛОК 1: замена масла")
        .await
        .expect("compose should succeed");
    assert_eq!(answer, "Каждые 10000 км.");

    let prompts = completer.prompts();
    assert_eq!(prompts.len(), 1);

    let (system, user) = &prompts[0];
    assert_eq!(system, SYSTEM_PROMPT);
    assert!(system.contains(INSUFFICIENT_CONTEXT_REPLY));
    assert!(user.starts_with("Вопрос: когда менять масло\n\n"));
    assert!(user.contains("Контекст из руководства по эксплуатации:\nБЛОК 1: замена масла\n"));
}

#[tokio::test]
async fn compose_trims_surrounding_whitespace() {
    let composer = AnswerComposer::new(Arc::new(ScriptedCompleter::new("\n\n  Ответ.\t \n")));

    let answer = composer
        .compose("вопрос", "контекст")
        .await
        .expect("compose should succeed");
    assert_eq!(answer, "Ответ.");
}

#[tokio::test]
async fn completion_failure_propagates() {
    let composer = AnswerComposer::new(Arc::new(FailingCompleter));
    let result = composer.compose("вопрос", "контекст").await;

    assert!(matches!(result, Err(ManualError::Completion(_))));
}

#[test]
fn user_prompt_layout() {
    let prompt = user_prompt("Q", "CTX");
    assert_eq!(
        prompt,
        "Вопрос: Q\n\nКонтекст из руководства по эксплуатации:\nCTX\n\nСформулируй полный и точный ответ на русском языке, используя ТОЛЬКО предоставленную информацию."
    );
}

#[test]
fn persona_quotes_the_insufficient_context_reply() {
    let quoted = format!("прямо скажи: \"{}\".\n", INSUFFICIENT_CONTEXT_REPLY);
    assert!(SYSTEM_PROMPT.contains(&quoted));
    assert!(SYSTEM_PROMPT.starts_with("Ты - автомобильный ассистент"));
    assert!(SYSTEM_PROMPT.ends_with("нумерованные шаги."));
}
