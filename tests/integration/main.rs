//! Integration tests for Serp-Rank
//!
//! These tests run the real rotation client against a local TCP server and
//! the real fetcher against a wiremock search engine.

mod config_tests;
mod rank_check_tests;
