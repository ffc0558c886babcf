//! Karma block allocator
//!
//! Credit-based arbitration of a fixed pool of indivisible blocks among a
//! dynamic set of tenants, one epoch at a time. Tenants that consume less
//! than their fair share earn credits; tenants that consume more spend them.
//! Compared with strict equal-share allocation this keeps the pool busy
//! (idle share is lent out) while bounding how far any tenant can run ahead
//! of its long-term entitlement.
//!
//! # Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`allocator`] | Epoch algorithm, configuration, public API |
//! | [`tenant`] | Per-tenant records and the tenant table |
//! | [`heap`] | Min-heap with O(1) add-to-all, the sweep workhorse |
//! | [`error`] | Error taxonomy and `Result` alias |
//!
//! # Examples
//!
//! ```rust
//! use karma_alloc::{KarmaAllocator, KarmaConfig};
//!
//! let config = KarmaConfig::with_blocks(100)
//!     .alpha(0.2)
//!     .init_credits(50);
//! let mut karma = KarmaAllocator::new(config).unwrap();
//!
//! karma.add_tenant(1).unwrap();
//! karma.add_tenant(2).unwrap();
//!
//! karma.set_demand(1, 10, false).unwrap();
//! karma.set_demand(2, 70, false).unwrap();
//! karma.allocate();
//!
//! assert_eq!(karma.get_allocation(1).unwrap(), 10);
//! assert!(karma.get_allocation(2).unwrap() >= karma.fair_share() as u32);
//! ```
//!
//! # Quality Standards
//!
//! - Property-based tests for the epoch invariants
//! - Deterministic outcomes for identical inputs
//! - Benchmarks for the broadcast heap and the epoch sweep

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod allocator;
pub mod error;
pub mod heap;
pub mod tenant;

pub use allocator::{KarmaAllocator, KarmaConfig, PoolStats};
pub use error::{Error, Result};
pub use tenant::{Tenant, TenantTable, DUMMY_ID, PUBLIC_ID};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
