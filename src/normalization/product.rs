use serde::Serialize;
use serde_json::Value;

use super::text::{is_truthy, norm_price, norm_text};
use super::RawRecord;

/// Canonical product metadata keyed by ASIN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub asin: String,
    pub title: String,
    pub brand: String,
    /// Passed through untouched; sources disagree on list vs string shapes.
    pub category: Value,
    pub price: Option<f64>,
    pub price_raw: Option<Value>,
}

/// Map a raw metadata record to a [`Product`]; `None` when it has no ASIN.
pub fn normalize_product(record: &RawRecord) -> Option<Product> {
    let asin = norm_text(record.get("asin"));
    if asin.is_empty() {
        return None;
    }

    let raw_price = record.get("price").filter(|v| !v.is_null());

    Some(Product {
        title: norm_text(record.get("title")),
        brand: norm_text(record.get("brand")),
        category: pick_category(record),
        price: norm_price(raw_price),
        price_raw: raw_price.cloned(),
        asin,
    })
}

// category -> categories -> main_cat
fn pick_category(record: &RawRecord) -> Value {
    if let Some(cat) = record.get("category").filter(|v| !v.is_null()) {
        return cat.clone();
    }
    if let Some(cats) = record.get("categories").filter(|v| is_truthy(v)) {
        return cats.clone();
    }
    record.get("main_cat").cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        match v {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn parses_price_range_and_keeps_raw() {
        let p = normalize_product(&record(json!({"asin": "B0001", "price": "19.99-24.99"})))
            .unwrap();
        assert_eq!(p.asin, "B0001");
        assert_eq!(p.price, Some(19.99));
        assert_eq!(p.price_raw, Some(json!("19.99-24.99")));
        assert_eq!(p.title, "");
        assert_eq!(p.brand, "");
        assert_eq!(p.category, Value::Null);
    }

    #[test]
    fn rejects_missing_or_blank_asin() {
        assert!(normalize_product(&record(json!({"title": "x"}))).is_none());
        assert!(normalize_product(&record(json!({"asin": "   "}))).is_none());
        assert!(normalize_product(&record(json!({"asin": null}))).is_none());
    }

    #[test]
    fn normalizes_text_fields() {
        let p = normalize_product(&record(json!({
            "asin": " B0003 ",
            "title": "  Wireless \n Mouse ",
            "brand": "Acme   Corp"
        })))
        .unwrap();
        assert_eq!(p.asin, "B0003");
        assert_eq!(p.title, "Wireless Mouse");
        assert_eq!(p.brand, "Acme Corp");
    }

    #[test]
    fn unparseable_price_does_not_reject() {
        let p = normalize_product(&record(json!({"asin": "B0004", "price": "N/A"}))).unwrap();
        assert_eq!(p.price, None);
        assert_eq!(p.price_raw, Some(json!("N/A")));
    }

    #[test]
    fn category_prefers_category_field() {
        let p = normalize_product(&record(json!({
            "asin": "B1",
            "category": ["Electronics", "Mice"],
            "categories": [["Other"]],
            "main_cat": "Computers"
        })))
        .unwrap();
        assert_eq!(p.category, json!(["Electronics", "Mice"]));
    }

    #[test]
    fn category_falls_back_in_order() {
        let p = normalize_product(&record(json!({
            "asin": "B1",
            "categories": [["Electronics"]],
            "main_cat": "Computers"
        })))
        .unwrap();
        assert_eq!(p.category, json!([["Electronics"]]));

        let p = normalize_product(&record(json!({
            "asin": "B1",
            "categories": [],
            "main_cat": "Computers"
        })))
        .unwrap();
        assert_eq!(p.category, json!("Computers"));
    }

    #[test]
    fn empty_category_list_is_kept_verbatim() {
        let p = normalize_product(&record(json!({
            "asin": "B1",
            "category": [],
            "main_cat": "Computers"
        })))
        .unwrap();
        assert_eq!(p.category, json!([]));
    }
}
