// ABOUTME: Pipeline stages: ingest, processor, analyzers, aggregator, supervisor
// ABOUTME: Components communicate only via the broker plus one in-process broadcast callback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Pipeline Core
//!
//! `messages_raw → processor → conversations_state → {sentiment, pii,
//! insights, summary} → {result topics} → aggregator → ai_aggregated ⇒
//! broadcaster`. The summary topic feeds back into the processor as cached
//! context only; it never re-triggers analysis.
//!
//! Each stage runs as one consumer task built around the shared
//! [`consumer::run_consumer`] loop, which owns retries, DLQ routing, and
//! offset commits so the stage handlers contain nothing but their own
//! semantics.

pub mod aggregator;
pub mod analyzers;
pub mod consumer;
/// Validated produce of inbound messages onto the raw topic
pub mod ingest;
pub mod processor;
pub mod supervisor;

pub use aggregator::Aggregator;
pub use analyzers::{AnalyzerKind, AnalyzerWorker};
pub use consumer::{ConsumerLoopConfig, DeadLetterRecord, RecordHandler};
pub use ingest::Ingestor;
pub use processor::ConversationProcessor;
pub use supervisor::Pipeline;
