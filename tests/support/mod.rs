//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod book;
pub mod socket_guard;
