//! Scenario test suite for the document model and runtime
//!
//! Unit tests live next to the code they cover; the suites here exercise
//! several components together.
