//! Prospect discovery and qualification pipeline.
//!
//! Finds people at a target organization through two discovery sources,
//! merges and enriches them, filters and scores them, and queues the survivors
//! as CRM write-backs awaiting human approval.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Pipeline stages and shared models.
//! - `integrations`: External service clients.
//! - `aggregator`: Concurrent discovery across both sources.
//! - `cache_validator`: Checksum-validated cache entries.
//! - `circuit_breaker`: Per-collaborator circuit breaker.
//! - `collaborators`: Traits for external systems.
//! - `config`: Configuration management.
//! - `crm_client`: CRM API client.
//! - `db`: Database pool and schema.
//! - `dedup`: Cross-source deduplication.
//! - `enrichment`: Profile enrichment gate.
//! - `errors`: Error handling types.
//! - `filters`: Filter cascade.
//! - `handlers`: HTTP request handlers.
//! - `matcher`: Organization name matching.
//! - `models`: Core data models.
//! - `name_normalizer`: Organization name variants.
//! - `pipeline`: End-to-end orchestration.
//! - `queue`: Approval queue and its stores.
//! - `resilience`: Timeout, retry and breaker wrapper for external calls.
//! - `scoring`: Qualification scoring and ranking.
//! - `services`: Discovery, enrichment and scoring clients.

pub mod api;
pub mod core;
pub mod integrations;

pub mod aggregator;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod collaborators;
pub mod config;
pub mod crm_client;
pub mod db;
pub mod dedup;
pub mod enrichment;
pub mod errors;
pub mod filters;
pub mod handlers;
pub mod matcher;
pub mod models;
pub mod name_normalizer;
pub mod pipeline;
pub mod queue;
pub mod resilience;
pub mod scoring;
pub mod services;
