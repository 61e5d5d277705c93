// src/tests/mod.rs
//! Tests for the composed request path
