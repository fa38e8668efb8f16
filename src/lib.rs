//! # Quiniela - Lottery Bet Intake Server
//!
//! This crate implements a small concurrent server that collects lottery bets
//! from a fixed number of agency clients, each streaming length-prefixed
//! batches of binary-encoded bets over a persistent TCP connection. Once every
//! agency has finished submitting, the server runs the draw exactly once and
//! sends each agency the document ids of its own winners.
//!
//! ## Architecture
//!
//! - **Bet codec** ([`bet`]): offset-header binary layout for one bet record,
//!   with partial-input detection kept distinct from malformed input
//! - **Protocol** ([`protocol`]): byte-exact framed reads/writes over partial
//!   socket I/O, plus the per-connection batch state machine
//! - **Store** ([`store`]): append-only CSV persistence with serialized appends
//! - **Draw** ([`draw`]): single-pass winner computation over the stored bets
//! - **Sync** ([`sync`]): abortable rendezvous barrier and a single-assignment
//!   result slot that make the "all agencies finished" edge explicit
//! - **Server** ([`server`]): accepts exactly N connections, one task each,
//!   and owns the barrier/store/result plumbing
//! - **Metrics** ([`metrics`]): cheap atomic counters for run summaries

pub mod bet;
pub mod draw;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod store;
pub mod sync;
