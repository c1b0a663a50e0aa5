//! blog-store: remote object storage and schema migrations for a blog
//! service.
//!
//! Two independent components live here:
//! - [`services::remote_storage`] — a façade over one bucket of an
//!   S3-compatible object store (write/read/stream/delete, presigned URLs).
//! - [`migrations`] — forward-only DDL for the `author`/`blog` tables plus
//!   the `aerich` bookkeeping table.

pub mod config;
pub mod errors;
pub mod migrations;
pub mod models;
pub mod services;
