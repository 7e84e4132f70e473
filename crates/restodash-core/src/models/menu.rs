//! Menu models: categories and the products listed under them.

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// A menu category. Categories may be split into named sections that
/// products are filed under.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub restaurant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name_ar: String,
    pub name_en: Option<String>,
    pub image_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_active: bool,
    pub sections: Option<Vec<String>>,
}

impl Category {
    pub fn sections(&self) -> &[String] {
        self.sections.as_deref().unwrap_or(&[])
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections().iter().any(|s| s == name)
    }

    /// English name when present, Arabic otherwise.
    pub fn display_name(&self) -> &str {
        match self.name_en.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.name_ar,
        }
    }
}

/// Fields for creating a category.
#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub name_ar: String,
    pub name_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_active: bool,
}

impl NewCategory {
    pub fn new(name_ar: impl Into<String>) -> Self {
        Self {
            name_ar: name_ar.into(),
            name_en: None,
            image_url: None,
            is_active: true,
        }
    }
}

/// Partial category update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub restaurant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub category_id: String,
    pub section: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name_ar: String,
    pub name_en: Option<String>,
    pub description_ar: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    pub image_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_available: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_featured: bool,
}

/// Fields for creating a product.
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub category_id: String,
    pub section: Option<String>,
    pub name_ar: String,
    pub name_en: Option<String>,
    pub description_ar: Option<String>,
    pub price: f64,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub is_featured: bool,
}

impl NewProduct {
    pub fn new(category_id: impl Into<String>, name_ar: impl Into<String>, price: f64) -> Self {
        Self {
            category_id: category_id.into(),
            section: None,
            name_ar: name_ar.into(),
            name_en: None,
            description_ar: None,
            price,
            image_url: None,
            is_available: true,
            is_featured: false,
        }
    }
}

/// Partial product update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
}
