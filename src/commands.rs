use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::answer::AnswerComposer;
use crate::chat::{ChatDispatcher, ChatReply, ChatRequest, ReplyKind};
use crate::config::Config;
use crate::database::VectorStore;
use crate::documents::{DirectorySource, DocumentSource};
use crate::embeddings::OllamaClient;
use crate::index::IndexStore;
use crate::session::{Pipeline, Session, SessionRegistry};

/// Chat id used by the terminal chat
const LOCAL_CHAT_ID: i64 = 0;

/// Wire the Ollama client, the LanceDB store and the document directory into a pipeline
#[inline]
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let client = Arc::new(OllamaClient::new(config).context("Failed to create Ollama client")?);
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector database")?;
    let source = DirectorySource::new(config.documents_dir());
    let embedder: Arc<OllamaClient> = Arc::clone(&client);

    info!(
        "Pipeline ready: documents in {}, vectors in {}",
        source.root().display(),
        store.path().display()
    );

    Ok(Pipeline::new(
        Arc::new(source),
        IndexStore::new(embedder, Arc::new(store)),
        AnswerComposer::new(client),
        config.chunking,
    )
    .with_chat_model(config.ollama.chat_model.clone())
    .with_offered_documents(config.documents.allowed.clone()))
}

/// Warn early when Ollama is unreachable; the pipeline reports failures per request anyway
fn check_ollama(config: &Config) {
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => info!(
                "✅ Ollama connected at {}:{}",
                config.ollama.host, config.ollama.port
            ),
            Err(e) => {
                warn!("⚠️  Ollama is reachable but unhealthy: {}", e);
                eprintln!("Warning: Ollama may not be ready. Loading and answering may fail.");
            }
        },
        Err(e) => error!("❌ Failed to create Ollama client: {}", e),
    }
}

/// List documents available in the documents directory
#[inline]
pub fn list_documents(config: &Config) -> Result<()> {
    let source = DirectorySource::new(config.documents_dir());
    let documents = source.list().context("Failed to list documents")?;

    if documents.is_empty() {
        println!(
            "No documents found in {}.",
            style(source.root().display()).cyan()
        );
        println!("Extract a manual with 'pdftotext Manual.pdf Manual.txt' and place the .txt file there.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();
    for document in &documents {
        let offered = config.documents.allowed.is_empty()
            || config.documents.allowed.iter().any(|name| name == document);
        if offered {
            println!("📘 {}", document);
        } else {
            println!("📘 {} {}", document, style("(not offered in chat)").dim());
        }
    }

    for missing in config
        .documents
        .allowed
        .iter()
        .filter(|name| !documents.contains(name))
    {
        println!(
            "⚠️  {} is offered in chat but has no extracted text",
            style(missing).yellow()
        );
    }

    Ok(())
}

/// Show Ollama, vector store and document directory health
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Manual QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                println!("   💬 Chat model: {}", config.ollama.chat_model);
            }
            Err(e) => println!("   ⚠️  Ollama: Connected but unhealthy - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to connect - {:#}", e),
    }

    println!("🔍 Vector Database Status:");
    match VectorStore::new(config).await {
        Ok(store) => match store.list_collections().await {
            Ok(collections) => {
                println!("   ✅ LanceDB: Connected ({})", store.path().display());
                println!("   📚 Collections: {}", collections.len());
                for collection in collections {
                    println!("      • {}", collection);
                }
            }
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {}", e),
        },
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    println!("📁 Documents:");
    let source = DirectorySource::new(config.documents_dir());
    match source.list() {
        Ok(documents) => println!(
            "   {} documents in {}",
            documents.len(),
            source.root().display()
        ),
        Err(e) => println!("   ❌ Failed to read {} - {}", source.root().display(), e),
    }

    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").context("Invalid spinner template")?,
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

/// Load one document and answer one question
#[inline]
pub async fn ask_once(config: &Config, document: &str, question: &str) -> Result<()> {
    check_ollama(config);
    let session = Session::new(Arc::new(build_pipeline(config).await?));

    let bar = spinner(format!("Загружаю файл '{}'...", document))?;
    let loaded = session.try_load(document).await;
    bar.finish_and_clear();
    if let Err(e) = loaded {
        return Err(anyhow::Error::new(e).context(format!("Failed to load {}", document)));
    }

    let bar = spinner(crate::chat::SEARCHING.to_string())?;
    let answer = session.ask(question).await;
    bar.finish_and_clear();

    println!("{}", answer);
    Ok(())
}

fn print_reply(reply: &ChatReply) {
    match reply.kind {
        ReplyKind::Working => println!("{}", style(&reply.text).dim()),
        ReplyKind::Final => println!("{}\n", reply.text),
    }
}

/// Interactive chat in the terminal
#[inline]
pub async fn run_chat(config: &Config) -> Result<()> {
    check_ollama(config);
    let pipeline = Arc::new(build_pipeline(config).await?);
    let dispatcher = ChatDispatcher::new(SessionRegistry::new(pipeline));

    println!("{}", crate::chat::WELCOME);
    println!();
    println!("{}", style("Ctrl-D to exit").dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let (replies, mut received) = mpsc::unbounded_channel();
        let request = ChatRequest {
            chat_id: LOCAL_CHAT_ID,
            text: line,
        };

        {
            let handled = dispatcher.handle(request, &replies);
            tokio::pin!(handled);
            loop {
                tokio::select! {
                    () = &mut handled => break,
                    Some(reply) = received.recv() => print_reply(&reply),
                }
            }
        }

        drop(replies);
        while let Some(reply) = received.recv().await {
            print_reply(&reply);
        }
    }

    Ok(())
}

/// Serve chat requests as line-delimited JSON on stdio
#[inline]
pub async fn serve_stdio(config: &Config) -> Result<()> {
    check_ollama(config);
    let pipeline = Arc::new(build_pipeline(config).await?);
    let dispatcher = Arc::new(ChatDispatcher::new(SessionRegistry::new(pipeline)));

    crate::chat::serve(
        dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
