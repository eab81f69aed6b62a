//! # spec-mirror
//!
//! A local-first mirror of Spec-kit project trees.
//!
//! spec-mirror parses the markdown documents a Spec-kit project produces
//! (`spec.md`, `plan.md`, `tasks.md`, `data-model.md`, `research.md`),
//! reconciles them into a relational SQLite mirror, and keeps that mirror
//! fresh with a debounced filesystem watcher. Optional AI analysis runs over
//! the persisted records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ specs/NNN-*/ │──▶│   Parsers    │──▶│  SQLite   │
//! │  markdown    │   │ spec/plan/…  │   │  mirror   │
//! └──────┬───────┘   └──────────────┘   └────┬─────┘
//!        │                                   │
//!   ┌────▼─────┐                       ┌─────▼────┐
//!   │ Watcher  │──── debounced ───────▶│   CLI    │
//!   │ (notify) │      re-sync          │  (spm)   │
//!   └──────────┘                       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! spm init                      # create database
//! spm sync                      # mirror the project tree
//! spm status                    # per-feature overview
//! spm watch                     # keep the mirror fresh
//! spm analyze 001 --kind gaps   # AI gap analysis (requires provider)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`markdown`] | Structural markdown reader |
//! | [`parser_spec`] | spec.md parser |
//! | [`parser_plan`] | plan.md parser |
//! | [`parser_tasks`] | tasks.md parser |
//! | [`parser_data_model`] | data-model.md parser |
//! | [`parser_research`] | research.md parser |
//! | [`sync`] | Feature sync orchestrator |
//! | [`watcher`] | Debounced filesystem watcher |
//! | [`store`] | Persistence trait and SQLite implementation |
//! | [`analysis`] | AI analysis over persisted records |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod config;
pub mod db;
pub mod markdown;
pub mod migrate;
pub mod models;
pub mod parser_data_model;
pub mod parser_plan;
pub mod parser_research;
pub mod parser_spec;
pub mod parser_tasks;
pub mod status;
pub mod store;
pub mod sync;
pub mod watcher;
