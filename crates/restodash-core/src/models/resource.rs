//! Typed payloads exchanged with the REST backend.
//!
//! A resource path is `<table>[?<query>]`. The table decides which
//! `ResourceData` variant a response body decodes into, so cached values
//! keep their shape through serialization.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::api::ApiError;

use super::{Category, Product, Review, Settings, User};

/// Tables the dashboard works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Categories,
    Products,
    Settings,
    Reviews,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Categories,
        Collection::Products,
        Collection::Settings,
        Collection::Reviews,
        Collection::Users,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Products => "products",
            Collection::Settings => "restaurant_settings",
            Collection::Reviews => "reviews",
            Collection::Users => "users",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.table() == table)
    }
}

/// Table part of a resource path (everything before `?`).
pub fn table_of(path: &str) -> &str {
    path.split_once('?').map_or(path, |(table, _)| table)
}

/// Build `<table>?<query>`, or just `<table>` for an empty query.
pub fn resource_path(table: &str, query: &str) -> String {
    if query.is_empty() {
        table.to_string()
    } else {
        format!("{}?{}", table, query)
    }
}

/// Rows returned for a resource, tagged by collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum ResourceData {
    Categories(Vec<Category>),
    Products(Vec<Product>),
    Settings(Vec<Settings>),
    Reviews(Vec<Review>),
    Users(Vec<User>),
    /// A table without a typed model.
    Other(serde_json::Value),
}

impl ResourceData {
    /// Decode a non-empty JSON body returned for `path`.
    pub fn decode(path: &str, body: &str) -> Result<Self, ApiError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ApiError::Decode(format!("{}: {}", table_of(path), e)))?;

        let Some(collection) = Collection::from_table(table_of(path)) else {
            return Ok(ResourceData::Other(value));
        };
        Ok(match collection {
            Collection::Categories => ResourceData::Categories(rows(collection, value)?),
            Collection::Products => ResourceData::Products(rows(collection, value)?),
            Collection::Settings => ResourceData::Settings(rows(collection, value)?),
            Collection::Reviews => ResourceData::Reviews(rows(collection, value)?),
            Collection::Users => ResourceData::Users(rows(collection, value)?),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ResourceData::Categories(v) => v.len(),
            ResourceData::Products(v) => v.len(),
            ResourceData::Settings(v) => v.len(),
            ResourceData::Reviews(v) => v.len(),
            ResourceData::Users(v) => v.len(),
            ResourceData::Other(serde_json::Value::Array(v)) => v.len(),
            ResourceData::Other(serde_json::Value::Null) => 0,
            ResourceData::Other(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// PostgREST answers with an array of rows; a bare object (single-row
/// responses) is accepted as one row.
fn rows<T: DeserializeOwned>(
    collection: Collection,
    value: serde_json::Value,
) -> Result<Vec<T>, ApiError> {
    let value = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Null => serde_json::Value::Array(Vec::new()),
        other => serde_json::Value::Array(vec![other]),
    };
    serde_json::from_value(value)
        .map_err(|e| ApiError::Decode(format!("{}: {}", collection.table(), e)))
}

/// A decoded response: either explicit "no content" or typed rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    NoContent,
    Data(ResourceData),
}

impl ApiResponse {
    /// Empty (or whitespace-only) bodies are `NoContent`, not an error.
    pub fn decode(path: &str, body: &str) -> Result<Self, ApiError> {
        if body.trim().is_empty() {
            return Ok(ApiResponse::NoContent);
        }
        ResourceData::decode(path, body).map(ApiResponse::Data)
    }

    pub fn data(&self) -> Option<&ResourceData> {
        match self {
            ApiResponse::Data(data) => Some(data),
            ApiResponse::NoContent => None,
        }
    }

    /// Extract typed rows. `NoContent` yields no rows; a response for a
    /// different collection is a decode failure.
    pub fn into_rows<T: FromResource>(self) -> Result<Vec<T>, ApiError> {
        match self {
            ApiResponse::NoContent => Ok(Vec::new()),
            ApiResponse::Data(data) => T::from_resource(data),
        }
    }
}

/// Models that can be pulled out of a `ResourceData`.
pub trait FromResource: Sized {
    const COLLECTION: Collection;

    fn from_resource(data: ResourceData) -> Result<Vec<Self>, ApiError>;
}

fn mismatch(expected: Collection, got: &ResourceData) -> ApiError {
    ApiError::Decode(format!(
        "expected {} rows, got {}",
        expected.table(),
        match got {
            ResourceData::Categories(_) => "categories",
            ResourceData::Products(_) => "products",
            ResourceData::Settings(_) => "restaurant_settings",
            ResourceData::Reviews(_) => "reviews",
            ResourceData::Users(_) => "users",
            ResourceData::Other(_) => "untyped",
        }
    ))
}

macro_rules! impl_from_resource {
    ($model:ty, $variant:ident) => {
        impl FromResource for $model {
            const COLLECTION: Collection = Collection::$variant;

            fn from_resource(data: ResourceData) -> Result<Vec<Self>, ApiError> {
                match data {
                    ResourceData::$variant(rows) => Ok(rows),
                    other => Err(mismatch(Self::COLLECTION, &other)),
                }
            }
        }
    };
}

impl_from_resource!(Category, Categories);
impl_from_resource!(Product, Products);
impl_from_resource!(Settings, Settings);
impl_from_resource!(Review, Reviews);
impl_from_resource!(User, Users);
