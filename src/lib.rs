// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Host Auth Broker - Mesh Host Registration Service
//!
//! This crate lets an edge host join a mesh network by authenticating over
//! a long-lived websocket, either with local credentials or through an
//! external SSO provider whose callback completes the join out of band.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Strategy resolution, user directory and credential issuance
//! - `broker` - Registration session state machine and completion polling
//! - `completer` - Out-of-band completion contract
//! - `store` - TTL-bound correlation store shared by broker and completer

pub mod api;
pub mod auth;
pub mod broker;
pub mod completer;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod models;
pub mod reaper;
pub mod state;
pub mod store;
pub mod token;
