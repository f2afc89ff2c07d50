//! Common code shared between `triage_server` and `triage_client`.
pub mod protocol;
