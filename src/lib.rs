//! Presence timeline service
//!
//! Records camera enter/exit events per tracking id and compiles them into a
//! timeline of who was seen where. Exposes modules for integration testing
//! and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
