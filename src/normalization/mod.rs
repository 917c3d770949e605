//! Pure transforms from raw NDJSON objects to the canonical product and
//! review shapes.

pub mod identity;
pub mod product;
pub mod review;
pub mod text;

/// One decoded input line. No schema is guaranteed.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

pub use identity::{review_id, stable_id};
pub use product::{normalize_product, Product};
pub use review::{normalize_review, Review};
pub use text::{norm_price, norm_text, value_text};
