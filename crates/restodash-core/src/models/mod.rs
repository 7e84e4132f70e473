//! Data models for restaurant dashboard entities.
//!
//! This module contains the data structures used to represent the
//! dashboard's backend tables:
//!
//! - `Category`, `Product`: the menu, with draft and patch types for writes
//! - `Settings`: restaurant branding and contact details
//! - `Review`, `User`: customer feedback and staff accounts
//! - `ResourceData`, `ApiResponse`: typed response payloads, as cached

pub mod menu;
pub mod resource;
pub mod restaurant;

pub use menu::{Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch};
pub use resource::{resource_path, table_of, ApiResponse, Collection, FromResource, ResourceData};
pub use restaurant::{Review, ReviewFilter, Settings, User, UserRole};

// Helper to read an explicit JSON null the same way as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize;

    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
