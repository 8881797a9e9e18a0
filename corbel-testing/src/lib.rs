//! Testing utilities for corbel applications.
//!
//! - [`TestClient`] drives a [`RouterEngine`](corbel_core::RouterEngine)
//!   in-process; requests go through the full pipeline without a socket.
//! - [`TestResponse`] wraps the response with fluent assertions.
//! - [`Spy`] records calls made from handlers, guards or mocks.
//!
//! ```
//! use corbel_core::prelude::*;
//! use corbel_testing::TestClient;
//!
//! struct Health;
//!
//! impl Controller for Health {
//!     fn declare(d: &mut ControllerDecl<'_, Self>) {
//!         d.controller("/health");
//!         d.get("/", "check", |_this, _args| async {
//!             Ok(Reply::Json(serde_json::json!({ "ok": true })))
//!         });
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let mut client = TestClient::isolated();
//! client.register(Health, None).unwrap();
//!
//! client
//!     .get("/health")
//!     .send()
//!     .await
//!     .assert_status(200)
//!     .assert_json(&serde_json::json!({ "ok": true }));
//! # });
//! ```

pub mod client;
pub mod response;
pub mod spy;

pub use client::{TestClient, TestRequestBuilder};
pub use response::TestResponse;
pub use spy::{Call, Spy};
