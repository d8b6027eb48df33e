//! Shop model
//!
//! The read-heavy entity served through the cache-aside client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shop entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    /// Primary key
    pub id: i64,

    /// Display name
    pub name: String,

    /// Shop category
    pub type_id: i64,

    /// Comma separated image URLs
    #[serde(default)]
    pub images: String,

    /// Business district
    pub area: Option<String>,

    /// Street address
    pub address: String,

    /// Longitude
    pub x: f64,

    /// Latitude
    pub y: f64,

    /// Average spend per customer
    pub avg_price: Option<i64>,

    /// Units sold
    #[serde(default)]
    pub sold: i32,

    /// Number of reviews
    #[serde(default)]
    pub comments: i32,

    /// Rating multiplied by ten (1-5 stars => 10-50)
    #[serde(default)]
    pub score: i32,

    /// Opening hours, e.g. "10:00-22:00"
    pub open_hours: Option<String>,

    pub create_time: DateTime<Utc>,

    pub update_time: DateTime<Utc>,
}

impl Shop {
    /// Build a shop with the required fields and zeroed counters
    pub fn new(id: i64, name: impl Into<String>, type_id: i64, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            type_id,
            images: String::new(),
            area: None,
            address: address.into(),
            x: 0.0,
            y: 0.0,
            avg_price: None,
            sold: 0,
            comments: 0,
            score: 0,
            open_hours: None,
            create_time: now,
            update_time: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let shop = Shop::new(1, "Tea House", 2, "1 Main St");
        let json = serde_json::to_value(&shop).unwrap();

        assert_eq!(json["typeId"], 2);
        assert!(json.get("openHours").is_some());
        assert!(json.get("type_id").is_none());
    }
}
