//! Integration tests
//!
//! `router` drives the axum router in-process against the in-memory store.
//! `api_tests` needs a running server and `postgres` a scratch database; both are ignored by default.

mod api_tests;
mod postgres;
mod router;
