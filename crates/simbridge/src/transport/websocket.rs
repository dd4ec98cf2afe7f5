// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! rosbridge WebSocket session.

use crossbeam::channel::Sender;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::session::{connect_or_close, IoCommand};
use super::{Endpoint, TransportEvent};
use crate::error::TransportError;

pub(super) async fn run(
    endpoint: &Endpoint,
    connect_timeout: Duration,
    commands: &mut UnboundedReceiver<IoCommand>,
    events: &Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let url = endpoint.ws_url();
    let connect = async {
        connect_async(url.as_str())
            .await
            .map(|(ws, _response)| ws)
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: url.clone(),
                reason: e.to_string(),
            })
    };

    let Some(ws) = connect_or_close(endpoint, connect_timeout, connect, commands, events).await?
    else {
        return Ok(());
    };
    tracing::debug!("websocket open: {}", url);
    let _ = events.send(TransportEvent::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(IoCommand::Send { id, frame }) => {
                    // rosbridge envelopes are JSON; anything else goes out as binary.
                    let message = match String::from_utf8(frame) {
                        Ok(text) => Message::text(text),
                        Err(e) => Message::binary(e.into_bytes()),
                    };
                    let result = ws_tx.send(message).await;
                    let _ = events.send(TransportEvent::Sent { id, ok: result.is_ok() });
                    if let Err(e) = result {
                        return Err(TransportError::SendFailed(e.to_string()));
                    }
                }
                Some(IoCommand::Close) | None => {
                    let _ = ws_tx.close().await;
                    return Ok(());
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Received(text.as_str().as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Received(bytes.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!("websocket closed by remote: {}", url);
                    return Ok(());
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            },
        }
    }
}
