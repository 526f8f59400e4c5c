//! Domain types and storage capabilities for the image job service.
//!
//! Nothing in this crate performs I/O. Backends for [`storage::StatusStore`]
//! and [`storage::WorkQueue`] live in `imagejob-db`.

pub mod error;
pub mod job;
pub mod storage;
pub mod types;
