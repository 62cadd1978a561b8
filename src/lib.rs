//! # Place Dedup
//!
//! A batch deduplication and canonical-merge engine for place records
//! (campsites, parking, points of interest) ingested from many external
//! sources.
//!
//! The engine finds candidate duplicate pairs across sources, decides
//! which of two records survives as canonical, merges the losing
//! record's data into the survivor without losing information, and keeps
//! a durable audit trail so the whole process is idempotent and safely
//! re-runnable.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────┐
//! │ places   │──▶│  Matcher    │──▶│  candidates    │──▶│  merge    │
//! │ (SQLite) │   │ geo + name  │   │ pending/…      │   │ executor  │
//! └──────────┘   └────────────┘   └───────────────┘   └────┬─────┘
//!                                                          │
//!                              mappings + history + report ◀┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdd init                      # create database schema
//! pdd populate                  # discover pending candidate pairs
//! pdd candidates                # review the queue (dry-run)
//! pdd merge                     # auto-merge high-confidence pairs
//! pdd run                       # populate + merge + backfill in one go
//! pdd stats                     # counts per table and status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`matcher`] | Proximity/similarity capability proposing scored pairs |
//! | [`confidence`] | Pure pair-confidence scoring (0–100) |
//! | [`quality`] | Per-record completeness/trust score |
//! | [`candidates`] | Candidate lifecycle: populate, review, resolve |
//! | [`select`] | Canonical-vs-absorbed decision |
//! | [`merge`] | Transactional field-policy merge + audit rows |
//! | [`batch`] | Orchestrator: auto-merge loop, backfill, full run |
//! | [`stats`] | Statistics-only report |

pub mod batch;
pub mod candidates;
pub mod config;
pub mod confidence;
pub mod db;
pub mod matcher;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod quality;
pub mod select;
pub mod stats;
