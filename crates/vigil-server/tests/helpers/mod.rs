//! Test helpers para vigil-server.

#![allow(dead_code, unused_imports)]

pub mod app;
pub mod client;

pub use app::{CountingReconciler, TestApp, WEBHOOK_SECRET, settings};
pub use client::{TestClient, TestResponse};
