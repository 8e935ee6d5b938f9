// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent connection abstraction.
//!
//! The broker treats the agent link as an opaque bidirectional message
//! channel with text/binary frames and a close handshake. Production uses
//! the axum [`WebSocket`]; tests use an in-memory pair.

use std::future::Future;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use thiserror::Error;

/// A frame exchanged with the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMessage {
    Text(String),
    Binary(Vec<u8>),
    /// Normal closure, no payload.
    Close,
}

/// Frame kind used for replies, mirroring the agent's opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl FrameKind {
    pub fn wrap(self, payload: String) -> AgentMessage {
        match self {
            FrameKind::Text => AgentMessage::Text(payload),
            FrameKind::Binary => AgentMessage::Binary(payload.into_bytes()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Bidirectional agent link.
pub trait AgentConnection: Send {
    /// Next data or close frame; `None` once the peer is gone.
    fn recv(&mut self) -> impl Future<Output = Option<Result<AgentMessage, ConnectionError>>> + Send;

    fn send(&mut self, message: AgentMessage) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

impl AgentConnection for WebSocket {
    async fn recv(&mut self) -> Option<Result<AgentMessage, ConnectionError>> {
        loop {
            let message = match WebSocket::recv(self).await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            };
            return Some(Ok(match message {
                Message::Text(text) => AgentMessage::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => AgentMessage::Binary(bytes.to_vec()),
                Message::Close(_) => AgentMessage::Close,
                // Control frames are answered by the websocket layer.
                Message::Ping(_) | Message::Pong(_) => continue,
            }));
        }
    }

    async fn send(&mut self, message: AgentMessage) -> Result<(), ConnectionError> {
        let frame = match message {
            AgentMessage::Text(text) => Message::Text(text.into()),
            AgentMessage::Binary(bytes) => Message::Binary(bytes.into()),
            AgentMessage::Close => Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: String::new().into(),
            })),
        };
        WebSocket::send(self, frame)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}
