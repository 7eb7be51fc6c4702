//! Integration tests for Catalog-Sieve
//!
//! These tests use wiremock to serve synthetic sites and drive the fetcher,
//! the crawler and the pipeline against them.

mod common;
mod crawl_tests;
mod fetch_tests;
mod pipeline_tests;
