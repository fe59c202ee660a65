//! Consolidated test modules.
//!
//! This module contains end-to-end tests that drive the real HTTP client
//! against a mock CI API.
