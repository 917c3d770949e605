use serde::Serialize;

use super::identity::review_id;
use super::text::norm_text;
use super::RawRecord;

/// Canonical review. Serialized field order is the shard line layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub review_id: String,
    pub asin: String,
    pub review_text: String,
    pub summary_text: String,
}

/// Map a raw review record to a [`Review`].
///
/// Returns `None` when the ASIN is blank or when both the review body and
/// summary are empty after normalization. The review timestamp only feeds
/// the identity hash.
pub fn normalize_review(record: &RawRecord) -> Option<Review> {
    let asin = norm_text(record.get("asin"));
    if asin.is_empty() {
        return None;
    }

    let review_text = norm_text(record.get("reviewText"));
    let summary_text = norm_text(record.get("summary"));
    if review_text.is_empty() && summary_text.is_empty() {
        return None;
    }

    let review_time = norm_text(record.get("unixReviewTime"));

    Some(Review {
        review_id: review_id(&asin, &review_text, &summary_text, &review_time),
        asin,
        review_text,
        summary_text,
    })
}
