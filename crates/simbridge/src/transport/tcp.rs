// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cyber bridge TCP session with length-prefix framing.

use crossbeam::channel::Sender;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

use super::session::{connect_or_close, IoCommand};
use super::{Endpoint, TransportEvent};
use crate::error::TransportError;
use crate::wire::FrameCodec;

/// Socket read buffer size.
const READ_BUFFER_SIZE: usize = 16 * 1024;

pub(super) async fn run(
    endpoint: &Endpoint,
    connect_timeout: Duration,
    max_frame_size: usize,
    commands: &mut UnboundedReceiver<IoCommand>,
    events: &Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let authority = endpoint.authority();
    let connect = async {
        TcpStream::connect(authority.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: authority.clone(),
                reason: e.to_string(),
            })
    };

    let Some(stream) =
        connect_or_close(endpoint, connect_timeout, connect, commands, events).await?
    else {
        return Ok(());
    };
    stream.set_nodelay(true)?;
    tracing::debug!("tcp open: {}", authority);
    let _ = events.send(TransportEvent::Opened);

    let (mut reader, mut writer) = stream.into_split();
    let mut codec = FrameCodec::new(max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(IoCommand::Send { id, frame }) => {
                    let result = writer.write_all(&frame).await;
                    let _ = events.send(TransportEvent::Sent { id, ok: result.is_ok() });
                    if let Err(e) = result {
                        return Err(TransportError::SendFailed(e.to_string()));
                    }
                }
                Some(IoCommand::Close) | None => {
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!("tcp closed by remote: {}", authority);
                    return Ok(());
                }
                Ok(n) => {
                    codec.push(&buf[..n]);
                    loop {
                        match codec.next_frame() {
                            Ok(Some(frame)) => {
                                let _ = events.send(TransportEvent::Received(frame));
                            }
                            Ok(None) => break,
                            // Stream framing is lost; the connection cannot recover.
                            Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
                        }
                    }
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            },
        }
    }
}
