//! Integration tests for layered merge, caching and editing sessions

mod cache_lifecycle;
mod merge_props;
mod scenarios;
mod support;
