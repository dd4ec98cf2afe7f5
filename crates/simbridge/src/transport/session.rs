// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background I/O thread for one open attempt.
//!
//! Each [`IoSession`] owns a named OS thread running a current-thread tokio
//! runtime. Commands flow in over a tokio channel so the async side can
//! `select!` on them; events flow out over a crossbeam channel so the
//! owner can poll without a runtime.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::future::Future;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{tcp, websocket, Endpoint, TransportEvent};
use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::wire::Encoding;

/// Commands sent to the I/O thread.
#[derive(Debug)]
pub(super) enum IoCommand {
    /// Write one frame.
    Send { id: u64, frame: Vec<u8> },
    /// Close the socket and stop the thread.
    Close,
}

/// Handle to a running I/O thread.
#[derive(Debug)]
pub(super) struct IoSession {
    cmd_tx: UnboundedSender<IoCommand>,
    event_rx: Receiver<TransportEvent>,
    thread: Option<JoinHandle<()>>,
    /// A `Closed` event has been handed out.
    closed: bool,
}

impl IoSession {
    pub fn spawn(endpoint: Endpoint, config: &ConnectionConfig) -> Result<Self, TransportError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = channel::unbounded();
        let connect_timeout = config.connect_timeout();
        let max_frame_size = config.max_frame_size;

        let thread = thread::Builder::new()
            .name(format!("simbridge-io-{}", endpoint.authority()))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Closed {
                            reason: Some(TransportError::Io(e.to_string())),
                        });
                        return;
                    }
                };
                runtime.block_on(run(
                    endpoint,
                    connect_timeout,
                    max_frame_size,
                    cmd_rx,
                    event_tx,
                ));
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            thread: Some(thread),
            closed: false,
        })
    }

    pub fn send(&self, id: u64, frame: Vec<u8>) -> Result<(), TransportError> {
        self.cmd_tx
            .send(IoCommand::Send { id, frame })
            .map_err(|_| TransportError::NotOpen)
    }

    /// Try to receive an event (non-blocking).
    ///
    /// If the thread vanished without reporting, a single synthetic
    /// `Closed` is returned.
    pub fn try_event(&mut self) -> Option<TransportEvent> {
        match self.event_rx.try_recv() {
            Ok(event) => {
                if matches!(event, TransportEvent::Closed { .. }) {
                    self.closed = true;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) if !self.closed => {
                self.closed = true;
                Some(TransportEvent::Closed {
                    reason: Some(TransportError::Io("I/O thread stopped".into())),
                })
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Ask the thread to stop. Does not wait for it.
    pub fn close(mut self) {
        let _ = self.cmd_tx.send(IoCommand::Close);
        self.thread.take();
    }
}

impl Drop for IoSession {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(IoCommand::Close);
    }
}

async fn run(
    endpoint: Endpoint,
    connect_timeout: Duration,
    max_frame_size: usize,
    mut commands: UnboundedReceiver<IoCommand>,
    events: Sender<TransportEvent>,
) {
    tracing::debug!("I/O session starting for {}", endpoint);
    let result = match endpoint.version.encoding() {
        Encoding::Text => websocket::run(&endpoint, connect_timeout, &mut commands, &events).await,
        Encoding::Binary => {
            tcp::run(
                &endpoint,
                connect_timeout,
                max_frame_size,
                &mut commands,
                &events,
            )
            .await
        }
    };

    let reason = result.err();
    match &reason {
        Some(e) => tracing::debug!("I/O session for {} ended: {}", endpoint, e),
        None => tracing::debug!("I/O session for {} ended", endpoint),
    }
    let _ = events.send(TransportEvent::Closed { reason });
}

/// Drive `connect` to completion while honoring commands.
///
/// Returns `Ok(None)` if the session was closed before the open finished.
/// Sends issued meanwhile fail immediately.
pub(super) async fn connect_or_close<T, F>(
    endpoint: &Endpoint,
    timeout: Duration,
    connect: F,
    commands: &mut UnboundedReceiver<IoCommand>,
    events: &Sender<TransportEvent>,
) -> Result<Option<T>, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    let connect = tokio::time::timeout(timeout, connect);
    tokio::pin!(connect);

    loop {
        tokio::select! {
            res = &mut connect => {
                return match res {
                    Ok(Ok(stream)) => Ok(Some(stream)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(TransportError::ConnectTimeout {
                        endpoint: endpoint.authority(),
                    }),
                };
            }
            cmd = commands.recv() => match cmd {
                Some(IoCommand::Send { id, .. }) => {
                    let _ = events.send(TransportEvent::Sent { id, ok: false });
                }
                Some(IoCommand::Close) | None => return Ok(None),
            },
        }
    }
}
