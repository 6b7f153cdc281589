//! One transport instance.
//!
//! A link owns a single WebSocket for its whole life: it opens it, forwards
//! text frames to the manager, writes outgoing frames, and reports exactly
//! one terminal [`LinkEvent::Closed`] unless it was cancelled. Every event
//! carries the link id so the manager can drop events from a link it has
//! already replaced.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::constants::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Event reported by a link task.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// Handshake finished; the transport is open.
    Opened {
        /// Reporting link.
        link_id: u64,
    },
    /// A text frame arrived.
    Frame {
        /// Reporting link.
        link_id: u64,
        /// Frame contents.
        text: String,
    },
    /// The transport closed or failed. Not sent after cancellation.
    Closed {
        /// Reporting link.
        link_id: u64,
        /// Close code (1006 when the transport failed without one).
        code: u16,
        /// Close reason or error description.
        reason: String,
    },
}

/// Manager-side handle to a running link task.
#[derive(Debug)]
pub(crate) struct Link {
    id: u64,
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<String>,
    open: bool,
}

impl Link {
    /// Spawn a link task connecting to `url`.
    pub(crate) fn spawn(id: u64, url: Url, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        let cancel = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_link(id, url, cancel.clone(), outgoing_rx, events));

        Self {
            id,
            cancel,
            outgoing,
            open: false,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    /// Queue a text frame. Dropped silently if the task has exited.
    pub(crate) fn send_text(&self, text: &str) {
        if self.outgoing.send(text.to_string()).is_err() {
            log::debug!("[Link {}] Send after task exit dropped", self.id);
        }
    }

    /// Close with a normal-closure frame and stop the task.
    pub(crate) fn close(self) {
        self.cancel.cancel();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // A replaced or forgotten link must never keep its socket alive
        self.cancel.cancel();
    }
}

async fn run_link(
    link_id: u64,
    url: Url,
    cancel: CancellationToken,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let report_closed = |code: u16, reason: String| {
        let _ = events.send(LinkEvent::Closed {
            link_id,
            code,
            reason,
        });
    };

    log::info!("[Link {}] Connecting to {}", link_id, redact_token(&url));

    let (mut writer, mut reader) = tokio::select! {
        () = cancel.cancelled() => {
            log::debug!("[Link {}] Cancelled while connecting", link_id);
            return;
        }
        result = ws::connect(url.as_str()) => match result {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("[Link {}] Connection failed: {:#}", link_id, e);
                report_closed(ABNORMAL_CLOSURE, format!("{e:#}"));
                return;
            }
        }
    };

    let _ = events.send(LinkEvent::Opened { link_id });

    let (code, reason) = pump(link_id, &cancel, &mut writer, &mut reader, &mut outgoing_rx, &events).await;
    match code {
        Some(code) => report_closed(code, reason),
        None => {
            if let Err(e) = writer.send_close(NORMAL_CLOSURE).await {
                log::debug!("[Link {}] Close frame not sent: {}", link_id, e);
            }
            let _ = writer.close().await;
            log::debug!("[Link {}] Closed by manager", link_id);
        }
    }
}

/// Move frames until the transport ends (`Some(code)`) or the link is
/// cancelled (`None`).
async fn pump(
    link_id: u64,
    cancel: &CancellationToken,
    writer: &mut WsWriter,
    reader: &mut WsReader,
    outgoing_rx: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> (Option<u16>, String) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return (None, String::new()),

            Some(text) = outgoing_rx.recv() => {
                if let Err(e) = writer.send_text(&text).await {
                    log::warn!("[Link {}] Transport error while sending: {:#}", link_id, e);
                    return (Some(ABNORMAL_CLOSURE), format!("{e:#}"));
                }
                log::trace!("[Link {}] Sent {}", link_id, text);
            }

            frame = reader.recv() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    log::trace!("[Link {}] Received {}", link_id, text);
                    let _ = events.send(LinkEvent::Frame { link_id, text });
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = writer.send_pong(data).await;
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    log::info!("[Link {}] Closed by server (code {})", link_id, code);
                    return (Some(code), reason);
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    log::debug!("[Link {}] Ignoring {}-byte binary frame", link_id, data.len());
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Err(e)) => {
                    log::warn!("[Link {}] Transport error: {:#}", link_id, e);
                    return (Some(ABNORMAL_CLOSURE), format!("{e:#}"));
                }
                None => {
                    log::info!("[Link {}] Stream ended without close frame", link_id);
                    return (Some(ABNORMAL_CLOSURE), "stream ended".to_string());
                }
            },
        }
    }
}

/// URL for logs with the token value masked.
pub(crate) fn redact_token(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    masked
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(key, value)| {
            if key == "token" {
                (key.as_str(), "***")
            } else {
                (key.as_str(), value.as_str())
            }
        }));
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_token_masks_value() {
        let url = Url::parse("ws://localhost:8000/api/realtime/ws?user_id=u1&token=secret")
            .expect("valid url");
        let redacted = redact_token(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("user_id=u1"));
        assert!(redacted.contains("token=***") || redacted.contains("token=%2A%2A%2A"));
    }

    #[test]
    fn test_redact_token_without_token_is_unchanged() {
        let url = Url::parse("ws://localhost:8000/ws?user_id=u1").expect("valid url");
        assert_eq!(redact_token(&url), url.to_string());
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_abnormal_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = Url::parse("ws://127.0.0.1:1/api/realtime/ws").expect("valid url");
        let _link = Link::spawn(7, url, tx);

        match rx.recv().await {
            Some(LinkEvent::Closed { link_id, code, .. }) => {
                assert_eq!(link_id, 7);
                assert_eq!(code, 1006);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }
}
