//! Pipeline scenario tests.
