// Chat front-end module
// Transport-agnostic command dispatch over per-chat sessions


pub mod protocol;
pub mod server;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::session::{Session, SessionRegistry, SystemStatus};

pub use protocol::{ChatReply, ChatRequest, ReplyKind};
pub use server::serve;

pub const WELCOME: &str = "Добро пожаловать в AutoBot! Чат-бот предназначен для автовладельцев и может дать ответы на вопросы по эксплуатации Вашего автомобиля.

Доступные команды:
/load_pdf - Загрузить PDF файл из перечня доступных моделей автомобилей
/status - Статус системы
/help - Эта справка

Как пользоваться:
1. Нажмите /load_pdf
2. Выберите файл из списка
3. Задавайте вопросы";

pub const UNKNOWN_COMMAND: &str = "Неизвестная команда. Используйте /help для списка команд";
pub const SEARCHING: &str = "🔍 Ищу информацию в документах...";
pub const NO_DOCUMENTS: &str = "Нет доступных документов. Добавьте файлы в папку документов.";

/// A parsed `/command args` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: &'a str,
}

/// Split `/name@bot args` into its command name and argument text
#[inline]
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let name = head.split_once('@').map_or(head, |(name, _)| name);
    Some(Command {
        name,
        args: args.trim(),
    })
}

/// Routes chat messages to sessions and reports results through a reply channel
pub struct ChatDispatcher {
    registry: SessionRegistry,
    waiting_for_document: Mutex<HashSet<i64>>,
}

impl ChatDispatcher {
    #[inline]
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            waiting_for_document: Mutex::new(HashSet::new()),
        }
    }

    #[inline]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Whether the chat's next plain message is taken as a document name
    #[inline]
    pub fn is_waiting_for_document(&self, chat_id: i64) -> bool {
        self.waiting().contains(&chat_id)
    }

    fn waiting(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.waiting_for_document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one message, sending a `Working` reply before any long operation
    /// and exactly one `Final` reply per non-blank message
    #[inline]
    pub async fn handle(&self, request: ChatRequest, replies: &UnboundedSender<ChatReply>) {
        let chat_id = request.chat_id;
        let text = request.text.trim();
        if text.is_empty() {
            return;
        }

        let send = |reply: ChatReply| {
            if replies.send(reply).is_err() {
                warn!("Reply channel closed, dropping reply for chat {}", chat_id);
            }
        };

        let session = self.registry.session(chat_id);

        if let Some(command) = parse_command(text) {
            debug!("Chat {} sent command /{}", chat_id, command.name);
            match command.name {
                "start" | "help" => send(ChatReply::final_text(chat_id, WELCOME)),
                "load_pdf" if !command.args.is_empty() => {
                    self.load_named(&session, chat_id, command.args, &send).await;
                }
                "load_pdf" => send(ChatReply::final_text(chat_id, self.offer_documents(chat_id))),
                "status" => send(ChatReply::final_text(
                    chat_id,
                    render_status(&session.status().await),
                )),
                _ => send(ChatReply::final_text(chat_id, UNKNOWN_COMMAND)),
            }
            return;
        }

        if self.is_waiting_for_document(chat_id) {
            self.load_named(&session, chat_id, text, &send).await;
            return;
        }

        // Waits behind a running load instead of refusing
        let Some(question) = session.begin_question().await else {
            send(ChatReply::final_text(chat_id, crate::session::NOT_READY));
            return;
        };

        send(ChatReply::working(chat_id, SEARCHING));
        let answer = question.answer(text).await;
        send(ChatReply::final_text(chat_id, answer));
    }

    fn offer_documents(&self, chat_id: i64) -> String {
        let documents = match self.registry.pipeline().offered_documents() {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Failed to list documents: {}", e);
                return format!("Не удалось получить список документов: {}", e);
            }
        };

        if documents.is_empty() {
            return NO_DOCUMENTS.to_string();
        }

        self.waiting().insert(chat_id);

        let listing: Vec<String> = documents.iter().map(|name| format!("• {}", name)).collect();
        format!(
            "Выберите PDF файл для загрузки:\n\n{}\n\nПросто отправьте название файла (например: {})",
            listing.join("\n"),
            documents[0]
        )
    }

    async fn load_named<F>(&self, session: &Arc<Session>, chat_id: i64, name: &str, send: &F)
    where
        F: Fn(ChatReply),
    {
        let offered = match self.registry.pipeline().offered_documents() {
            Ok(offered) => offered,
            Err(e) => {
                send(ChatReply::final_text(
                    chat_id,
                    format!("Не удалось получить список документов: {}", e),
                ));
                return;
            }
        };

        if !offered.iter().any(|offer| offer == name) {
            send(ChatReply::final_text(
                chat_id,
                format!(
                    "Файл '{}' не найден в списке доступных. Пожалуйста, выберите из списка выше.",
                    name
                ),
            ));
            return;
        }

        self.waiting().remove(&chat_id);

        send(ChatReply::working(chat_id, format!("Загружаю файл '{}'...", name)));
        let outcome = session.load(name).await;
        send(ChatReply::final_text(chat_id, outcome));
    }
}

/// Render a session status for chat users
#[inline]
pub fn render_status(status: &SystemStatus) -> String {
    let mut text = String::from("Статус системы:\n\n");
    let loaded = if status.document_loaded { "✅" } else { "❌" };

    // Writing to a String cannot fail
    let _ = writeln!(text, "• PDF загружен: {}", loaded);
    if let Some(document) = &status.active_document {
        let _ = writeln!(text, "• Документ: {}", document);
    }
    if let Some(document) = &status.loading {
        let _ = writeln!(text, "• Загружается: {}", document);
    }
    let _ = writeln!(text, "• База данных: {}", status.vector_db_status);
    if let Some(count) = status.documents_count {
        let _ = writeln!(text, "• Фрагментов в индексе: {}", count);
    }
    let _ = writeln!(text, "• Агенты: {}", status.agents_status);
    let _ = writeln!(text, "• Модель: {}", status.chat_model);
    text.push_str("\nИспользуйте /load_pdf для загрузки документов");
    text
}
