//! # Grant Store Testkit
//!
//! Testing utilities for the grant store.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: user data values with their expected envelope bytes
//! - **Generators**: proptest strategies for user data and grant records
//! - **Fixtures**: ready-made clients, authorization codes and access tokens
//!
//! ## Golden Vectors
//!
//! ```rust
//! use grantstore_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, hex) in verify_all_vectors() {
//!     assert!(ok, "{}: got {}", name, hex);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use grantstore_testkit::generators::user_data;
//! use grantstore_testkit::fixtures::sample_codec;
//!
//! proptest! {
//!     #[test]
//!     fn user_data_roundtrips(value in user_data()) {
//!         let codec = sample_codec();
//!         let envelope = codec.encode(&value).unwrap();
//!         prop_assert_eq!(codec.decode(envelope).unwrap(), value);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use grantstore_testkit::fixtures::GrantFixture;
//!
//! let mut fixture = GrantFixture::with_seed(7);
//! let authorize = fixture.authorize();
//! let access = fixture.access_from(&authorize);
//! assert_eq!(access.client.id, fixture.client.id);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{random_token, sample_codec, sample_registry, GrantFixture, SampleSession};
pub use generators::{access_from_params, AccessParams};
pub use vectors::{all_vectors, vectors_json, verify_all_vectors, EnvelopeVector};
