//! Newline-delimited JSON transport in front of a page session.
//!
//! Each input line is one request. Requests run concurrently, so a response
//! echoes the request's `id` when it had one. Notifications are written as
//! `{"notification": {...}}` lines on the same stream.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::errors::FormPilotResult;
use crate::session::{handle_message, PageSession};

pub async fn serve<R, W>(session: Arc<PageSession>, input: R, output: W) -> FormPilotResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(value) = rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if let Err(e) = output.write_all(line.as_bytes()).await {
                tracing::error!(error = %e, "output closed");
                break;
            }
            if let Err(e) = output.flush().await {
                tracing::error!(error = %e, "output flush failed");
                break;
            }
        }
    });

    let notifications = {
        let tx = tx.clone();
        let mut sub = session.notifier().subscribe();
        tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(n) => {
                        if tx.send(json!({ "notification": n })).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let mut inflight = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let raw: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                let _ = tx.send(json!({ "success": false, "error": format!("Invalid JSON: {e}") }));
                continue;
            }
        };
        let id = raw.get("id").cloned();
        let session = session.clone();
        let tx = tx.clone();
        inflight.spawn(async move {
            let mut response = handle_message(&session, raw).await;
            if let (Some(id), Some(fields)) = (id, response.as_object_mut()) {
                fields.insert("id".into(), id);
            }
            let _ = tx.send(response);
        });
    }

    tracing::info!("input closed; waiting for in-flight requests");
    while let Some(joined) = inflight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "request task failed");
        }
    }
    notifications.abort();
    drop(tx);
    let _ = writer.await;
    Ok(())
}
