//! Line-delimited JSON chat transport
//!
//! Each input line is a [`ChatRequest`]; every reply is written as one
//! [`ChatReply`] line. Requests run on their own tasks so the reader never
//! blocks behind a slow load or answer.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::chat::{ChatDispatcher, ChatReply, ChatRequest};

/// Serve requests from `input` until EOF, then finish every in-flight request
#[inline]
pub async fn serve<R, W>(dispatcher: Arc<ChatDispatcher>, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("Starting chat server on line-delimited JSON");

    let (replies, outgoing) = mpsc::unbounded_channel::<ChatReply>();
    let writer = tokio::spawn(write_replies(outgoing, output));
    let mut in_flight = JoinSet::new();

    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("EOF reached, draining {} requests", in_flight.len());
                break;
            }
            Err(e) => {
                error!("Error reading request: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: ChatRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                continue;
            }
        };

        debug!("Request from chat {}", request.chat_id);
        let dispatcher = Arc::clone(&dispatcher);
        let replies = replies.clone();
        in_flight.spawn(async move {
            dispatcher.handle(request, &replies).await;
        });

        // Reap finished requests so the set stays small
        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }

    drop(replies);
    writer.await??;

    info!("Chat server stopped");
    Ok(())
}

async fn write_replies<W>(mut outgoing: mpsc::UnboundedReceiver<ChatReply>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outgoing.recv().await {
        let json = serde_json::to_string(&reply)?;
        output.write_all(json.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
