use serde_json::Value;

use crate::normalization::{value_text, Product, Review};

/// Insert tuple for `products_table`, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub asin: String,
    pub title: String,
    pub brand: String,
    pub category: Value,
    pub price: Option<f64>,
    pub price_raw: Option<String>,
    pub source_run: String,
}

impl ProductRow {
    pub fn new(product: Product, source_run: &str) -> Self {
        Self {
            price_raw: product.price_raw.as_ref().and_then(raw_price_text),
            asin: product.asin,
            title: product.title,
            brand: product.brand,
            category: product.category,
            price: product.price,
            source_run: source_run.to_string(),
        }
    }
}

fn raw_price_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(value_text(other)),
    }
}

/// Insert tuple for `reviews_table`, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    pub review_id: String,
    pub asin: String,
    pub review_text: String,
    pub summary_text: String,
    pub source_run: String,
}

impl ReviewRow {
    pub fn new(review: Review, source_run: &str) -> Self {
        Self {
            review_id: review.review_id,
            asin: review.asin,
            review_text: review.review_text,
            summary_text: review.summary_text,
            source_run: source_run.to_string(),
        }
    }
}
