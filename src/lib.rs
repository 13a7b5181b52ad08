#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Core
//!
//! Durable orchestration core for multi-phase media batch pipelines.
//!
//! ## Overview
//!
//! A caller submits a batch of files. The orchestrator runs the batch through
//! an ordered chain of phases; each phase discovers tasks from the current
//! file list, dispatches them to ephemeral remote compute workers, collects
//! their asynchronous completion callbacks and transforms the file list for
//! the next phase. When the chain ends the final list is delivered downstream.
//!
//! ## Architecture
//!
//! - One persisted [`models::BatchState`] per batch, read and written whole
//! - One durable wake-up timer per batch driving timer ticks
//! - Mutating operations on a batch are serialized by a per-batch lock, so a
//!   callback and a tick never both transition the same phase
//! - Phase-level failures retry with capped exponential backoff; delivery
//!   failures at finalization are terminal
//!
//! ## Module Organization
//!
//! - [`models`] - files, tasks, submissions and the batch aggregate
//! - [`state_machine`] - phase ids, batch/task statuses and legal transitions
//! - [`phases`] - the phase contract, the two concrete phases and the registry
//! - [`orchestration`] - the orchestrator, transition fold, backoff and timers
//! - [`state_store`] - durable state and timer capabilities (memory, PostgreSQL)
//! - [`clients`] - compute provisioning and downstream delivery over HTTP
//! - [`events`] - lifecycle event broadcast
//! - [`web`] - axum surface for intake, callbacks, status and admin reset
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//! - [`logging`] - tracing initialisation and structured log helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_core::clients::{HttpComputeProvisioner, HttpDeliverySink};
//! use pipeline_core::config::PipelineConfig;
//! use pipeline_core::orchestration::BatchOrchestrator;
//! use pipeline_core::phases::PhaseRegistry;
//! use pipeline_core::state_store::{MemoryStateStore, MemoryTimer};
//!
//! # fn example() -> pipeline_core::Result<()> {
//! let config = PipelineConfig::default();
//! let orchestrator = BatchOrchestrator::new(
//!     PhaseRegistry::standard()?,
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(MemoryTimer::new()),
//!     Arc::new(HttpDeliverySink::new(&config.delivery)?),
//!     Arc::new(HttpComputeProvisioner::new(&config.compute)?),
//!     &config,
//! );
//! # let _ = orchestrator;
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod phases;
pub mod state_machine;
pub mod state_store;
pub mod web;

pub use config::{ConfigManager, PipelineConfig};
pub use error::{PipelineError, Result};
pub use models::{BatchState, BatchStatusView, BatchSubmission, ProcessableFile, Task};
pub use orchestration::{BatchOrchestrator, CallbackOutcome, StartOutcome, TimerScheduler};
pub use phases::{Phase, PhaseRegistry};
pub use state_machine::{BatchStatus, PhaseId, TaskStatus};
