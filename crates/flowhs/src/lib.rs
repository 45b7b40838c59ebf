//! FlowHS - Flow Operation Orchestrator
//!
//! Drives flow changes (create, update, reroute, delete) across the switches
//! of an SDN fabric. Every change is a saga: rules of the new path are
//! installed and validated, rules of the old path are removed, and any
//! failure rolls the network back to where it started.
//!
//! # Architecture
//!
//! ```text
//! [flow request] ──> [FlowHsDaemon] ──> [FlowOperationSaga] ──> [Carrier] ──> [speakers]
//!                          ↑                   │                                  │
//!                          │                   ↓                                  │
//!                          │         [FlowRepository / History]                   │
//!                          └──────────── [SpeakerResponse] <──────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`daemon::FlowHsDaemon`]: one task per running saga, response routing
//! - [`flow_operation`]: the saga, its transition table and the reconciler
//! - [`rules`]: rule descriptors and the speaker request/response contract
//! - [`carrier`], [`persistence`], [`path_computer`], [`history`]:
//!   collaborator traits with in-memory implementations

pub mod audit;
pub mod carrier;
pub mod config;
pub mod daemon;
pub mod error;
pub mod flow_operation;
pub mod history;
pub mod model;
pub mod path_computer;
pub mod persistence;
pub mod rules;

pub use error::{FlowHsError, Result};
