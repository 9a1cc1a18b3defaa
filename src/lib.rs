// ABOUTME: SignalStream: real-time support-conversation intelligence pipeline
// ABOUTME: Fan-out/fan-in over a partitioned log with four AI analyzers and live broadcast
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # SignalStream
//!
//! Each inbound support message is ingested onto a durable log, enriched by
//! four independent AI analyses (sentiment, PII, insights, summary), merged
//! into a single monotonic per-conversation view, and streamed to live
//! subscribers.
//!
//! ```text
//! messages_raw → processor → conversations_state
//!       ┌──────────────┬──────────────┬──────────────┐
//!   sentiment         pii         insights       summary ─┐
//!       └──────────────┴──────┬───────┴──────────────┘    │ (feeds back into
//!                         aggregator → ai_aggregated      │  processor state,
//!                              ⇓ broadcast                │  no re-emit)
//!                          subscribers                ────┘
//! ```
//!
//! See the module docs for each stage's contract: [`pipeline::processor`]
//! for the summary loop guard, [`pipeline::aggregator`] for the merge
//! rules (notably PII monotonicity), [`model`] for the rate-limited model
//! client with deterministic fallbacks, and [`broadcast`] for the
//! slow-subscriber policy.

#![warn(missing_docs)]

/// Live fan-out of aggregated intelligence to subscribers
pub mod broadcast;
/// Broker adapter: Kafka-backed and in-memory implementations
pub mod broker;
/// Environment-driven configuration
pub mod config;
/// Compile-time defaults for topics and limits
pub mod constants;
/// Unified error handling
pub mod errors;
/// Logging configuration
pub mod logging;
/// Model provider abstraction and the rate-limited client
pub mod model;
/// Data model for messages, state, and intelligence results
pub mod models;
/// Pipeline stages and the supervisor
pub mod pipeline;
