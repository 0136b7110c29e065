//! aula: a room scheduling and booking engine that speaks the Postgres
//! wire protocol. Clients connect with any Postgres driver, manage rooms
//! and schedule entries with plain SQL, and push booking requests through
//! a pending → approved/rejected → reverted lifecycle. State lives in
//! memory, durably backed by a per-tenant write-ahead log.

pub mod auth;
pub mod catalog;
pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
