use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use stagewatch_logging::{sw_debug, sw_trace};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::wire::{decode_push_frame, ClientFrame};
use crate::{ChannelError, ChannelEvent};

/// WebSocket address of a job's push subscription, derived from the API base URL.
pub fn push_url(base: &Url, job_id: &str) -> Result<Url, ChannelError> {
    let mut url = base
        .join(&format!("ws/{job_id}"))
        .map_err(|err| ChannelError::Connect(err.to_string()))?;
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(ChannelError::Connect(format!("no push transport for scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::Connect(format!("cannot derive {scheme} url from {base}")))?;
    Ok(url)
}

/// Follows one job's push subscription until the server closes it or `cancel` fires.
///
/// Decoded events go to `tx`. Returns an error only for transport failures;
/// the caller decides how to degrade.
pub async fn run_push(
    url: Url,
    keepalive: Duration,
    tx: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) -> Result<(), ChannelError> {
    let (ws_stream, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        connected = connect_async(url.as_str()) => {
            connected.map_err(|err| ChannelError::Connect(err.to_string()))?
        }
    };
    sw_debug!("push channel open at {}", url);
    let (mut sink, mut stream) = ws_stream.split();

    sink.send(Message::Text(ClientFrame::RequestLogs.to_text().into()))
        .await
        .map_err(|err| ChannelError::Transport(err.to_string()))?;

    let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = keepalive.tick() => {
                sink.send(Message::Text(ClientFrame::Ping.to_text().into()))
                    .await
                    .map_err(|err| ChannelError::Transport(err.to_string()))?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    for event in decode_push_frame(&text) {
                        if tx.send(ChannelEvent::Raw(event)).await.is_err() {
                            // Nobody is listening any more.
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(ChannelError::Protocol("unexpected binary frame".to_string()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    sw_debug!("push channel closed by server");
                    return Ok(());
                }
                Some(Ok(other)) => sw_trace!("ignoring push control frame {:?}", other),
                Some(Err(err)) => return Err(ChannelError::Transport(err.to_string())),
            }
        }
    }
}
