//! Shop DTOs

use chrono::Utc;
use flashgate_core::models::Shop;
use serde::Deserialize;
use validator::Validate;

/// Body of `PUT /shops`
///
/// Timestamps are owned by the server and not accepted from clients.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShopUpdateRequest {
    #[validate(range(min = 1, message = "Shop id must be positive"))]
    pub id: i64,

    #[validate(length(min = 1, max = 128, message = "Shop name is required"))]
    pub name: String,

    pub type_id: i64,

    #[serde(default)]
    pub images: String,

    pub area: Option<String>,

    #[validate(length(max = 255))]
    pub address: String,

    pub x: f64,
    pub y: f64,
    pub avg_price: Option<i64>,

    #[serde(default)]
    pub sold: i32,

    #[serde(default)]
    pub comments: i32,

    /// Rating multiplied by ten
    #[serde(default)]
    #[validate(range(min = 0, max = 50))]
    pub score: i32,

    pub open_hours: Option<String>,
}

impl From<ShopUpdateRequest> for Shop {
    fn from(req: ShopUpdateRequest) -> Self {
        let now = Utc::now();
        Shop {
            id: req.id,
            name: req.name,
            type_id: req.type_id,
            images: req.images,
            area: req.area,
            address: req.address,
            x: req.x,
            y: req.y,
            avg_price: req.avg_price,
            sold: req.sold,
            comments: req.comments,
            score: req.score,
            open_hours: req.open_hours,
            create_time: now,
            update_time: now,
        }
    }
}
