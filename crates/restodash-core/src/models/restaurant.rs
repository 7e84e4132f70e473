//! Restaurant-level models: settings, customer reviews and staff users.

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Restaurant branding and contact settings. One row per restaurant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub restaurant_name_ar: String,
    pub restaurant_name_en: Option<String>,
    pub currency: Option<String>,
    pub primary_color: Option<String>,
    pub logo_url: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub tiktok_url: Option<String>,
    pub whatsapp_number: Option<String>,
    /// JSON-encoded list of banner image URLs.
    pub ad_banner_urls: Option<String>,
    pub social_ad_image: Option<String>,
    pub social_ad_video: Option<String>,
}

/// Currency label used when settings leave it blank.
pub const DEFAULT_CURRENCY: &str = "ج.م";

/// Brand color used when settings leave it blank.
pub const DEFAULT_PRIMARY_COLOR: &str = "#D97706";

impl Settings {
    /// Decode `ad_banner_urls`. Missing or malformed values yield no banners.
    pub fn banner_urls(&self) -> Vec<String> {
        self.ad_banner_urls
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }

    /// Store banner URLs, dropping empty entries. An empty list clears the field.
    pub fn set_banner_urls(&mut self, urls: &[String]) {
        let kept: Vec<&String> = urls.iter().filter(|u| !u.is_empty()).collect();
        self.ad_banner_urls = if kept.is_empty() {
            None
        } else {
            serde_json::to_string(&kept).ok()
        };
    }

    pub fn currency(&self) -> &str {
        match self.currency.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => DEFAULT_CURRENCY,
        }
    }

    pub fn primary_color(&self) -> &str {
        match self.primary_color.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => DEFAULT_PRIMARY_COLOR,
        }
    }

    /// Format an amount with this restaurant's currency.
    pub fn format_price(&self, amount: f64) -> String {
        format!("{} {}", amount, self.currency())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub restaurant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_governorate: Option<String>,
    pub customer_city: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub place_rating: u8,
    #[serde(deserialize_with = "null_as_default")]
    pub products_rating: u8,
    #[serde(deserialize_with = "null_as_default")]
    pub service_rating: u8,
    pub comment: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_approved: bool,
}

impl Review {
    /// Mean of the three ratings.
    pub fn average_rating(&self) -> f64 {
        let total =
            u32::from(self.place_rating) + u32::from(self.products_rating) + u32::from(self.service_rating);
        f64::from(total) / 3.0
    }
}

/// Which reviews to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewFilter {
    #[default]
    All,
    Approved,
    Pending,
}

impl ReviewFilter {
    pub fn matches(&self, review: &Review) -> bool {
        match self {
            ReviewFilter::All => true,
            ReviewFilter::Approved => review.is_approved,
            ReviewFilter::Pending => !review.is_approved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Staff,
    #[default]
    #[serde(other)]
    Unknown,
}

impl UserRole {
    fn rank(&self) -> u8 {
        match self {
            UserRole::Admin => 3,
            UserRole::Manager => 2,
            UserRole::Staff => 1,
            UserRole::Unknown => 0,
        }
    }

    /// Whether this role is at least as privileged as `required`.
    pub fn satisfies(&self, required: UserRole) -> bool {
        self.rank() >= required.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Manager => "Manager",
            UserRole::Staff => "Staff",
            UserRole::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub restaurant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    pub phone: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub role: UserRole,
    #[serde(deserialize_with = "null_as_default")]
    pub is_active: bool,
}

impl User {
    pub fn has_role(&self, required: UserRole) -> bool {
        self.role.satisfies(required)
    }
}
