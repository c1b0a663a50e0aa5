//! Service layer: the remote object storage façade.

pub mod remote_storage;
