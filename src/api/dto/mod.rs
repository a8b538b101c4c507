//! Data Transfer Objects for REST request/response serialization.

pub mod stats_dto;

pub use stats_dto::*;
