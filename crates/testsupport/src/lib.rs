//! Test support utilities for the hash index workspace.
//!
//! This crate provides:
//! - Isolated buffer pools over temporary database files
//! - Fixtures for record ids and keys aimed at specific buckets
//! - Property-based test generators for keys and record ids
//! - Assertion helpers for pin and error checks
//!
//! # Example Usage
//!
//! ```no_run
//! use testsupport::prelude::*;
//!
//! #[test]
//! fn insert_leaves_no_pins() {
//!     init_logger();
//!     let ctx = TestPool::new().unwrap();
//!     let pool = ctx.shared();
//!     // ... open an index over `pool` and exercise it ...
//!     assert_no_pins(&pool);
//! }
//! ```

pub mod assertions;
pub mod context;
pub mod fixtures;
pub mod proptest_generators;

use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Install an `env_logger` for tests. Safe to call from every test.
///
/// Defaults to `warn`; `RUST_LOG` overrides it.
pub fn init_logger() {
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();
        builder
            .filter_level(LevelFilter::Warn)
            .is_test(true)
            .format_timestamp_millis()
            .parse_default_env();
        let _ = builder.try_init();
    });
}

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::*;
    pub use crate::fixtures::*;
    pub use crate::init_logger;
}
