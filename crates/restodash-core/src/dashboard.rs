//! Dashboard operations for one restaurant.
//!
//! `RestaurantApi` turns screen-level actions (list products, toggle a
//! category, approve a review) into REST calls on a shared `RequestClient`.
//! Every list is scoped to the configured restaurant when one is set.

use serde::Serialize;
use tracing::{debug, info};

use crate::api::{ApiError, RequestClient};
use crate::models::{
    ApiResponse, Category, CategoryPatch, Collection, FromResource, NewCategory, NewProduct,
    Product, ProductPatch, Review, ReviewFilter, Settings, User,
};

/// A new row stamped with the owning restaurant.
#[derive(Serialize)]
struct Owned<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    restaurant_id: Option<&'a str>,
    #[serde(flatten)]
    row: &'a T,
}

#[derive(Serialize)]
struct SectionsPatch<'a> {
    sections: &'a [String],
}

fn by_id(id: &str) -> String {
    format!("id=eq.{}", id)
}

#[derive(Clone)]
pub struct RestaurantApi {
    client: RequestClient,
    restaurant_id: Option<String>,
}

impl RestaurantApi {
    pub fn new(client: RequestClient, restaurant_id: Option<String>) -> Self {
        Self {
            client,
            restaurant_id,
        }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn restaurant_id(&self) -> Option<&str> {
        self.restaurant_id.as_deref()
    }

    /// Query restricting a list to this restaurant, plus an ordering.
    fn scoped(&self, order: &str) -> String {
        match &self.restaurant_id {
            Some(id) => format!("restaurant_id=eq.{}&order={}", id, order),
            None => format!("order={}", order),
        }
    }

    async fn list<T: FromResource>(&self, order: &str) -> Result<Vec<T>, ApiError> {
        self.client
            .get(T::COLLECTION.table(), &self.scoped(order))
            .await?
            .into_rows()
    }

    async fn create<T: Serialize>(
        &self,
        collection: Collection,
        draft: &T,
    ) -> Result<ApiResponse, ApiError> {
        let row = Owned {
            restaurant_id: self.restaurant_id.as_deref(),
            row: draft,
        };
        self.client.post(collection.table(), &row).await
    }

    async fn update<B: Serialize + ?Sized>(
        &self,
        collection: Collection,
        id: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.client.patch(collection.table(), &by_id(id), body).await
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<(), ApiError> {
        self.client.delete(collection.table(), &by_id(id)).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.list("created_at.asc").await
    }

    /// Create a category. Returns the stored row when the backend echoes it.
    pub async fn create_category(&self, draft: &NewCategory) -> Result<Option<Category>, ApiError> {
        let created: Vec<Category> = self
            .create(Collection::Categories, draft)
            .await?
            .into_rows()?;
        Ok(created.into_iter().next())
    }

    pub async fn update_category(&self, id: &str, patch: &CategoryPatch) -> Result<(), ApiError> {
        self.update(Collection::Categories, id, patch).await?;
        Ok(())
    }

    pub async fn toggle_category(&self, id: &str, active: bool) -> Result<(), ApiError> {
        let patch = CategoryPatch {
            is_active: Some(active),
            ..CategoryPatch::default()
        };
        self.update_category(id, &patch).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Collection::Categories, id).await
    }

    /// Append a section to a category. Blank or duplicate names are
    /// rejected without a request and yield `false`.
    pub async fn add_section(&self, category: &Category, name: &str) -> Result<bool, ApiError> {
        let name = name.trim();
        if name.is_empty() || category.has_section(name) {
            debug!(category = %category.id, section = name, "Section rejected");
            return Ok(false);
        }

        let mut sections = category.sections().to_vec();
        sections.push(name.to_string());
        self.update(
            Collection::Categories,
            &category.id,
            &SectionsPatch {
                sections: &sections,
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn remove_section(&self, category: &Category, name: &str) -> Result<(), ApiError> {
        let sections: Vec<String> = category
            .sections()
            .iter()
            .filter(|s| s.as_str() != name)
            .cloned()
            .collect();
        self.update(
            Collection::Categories,
            &category.id,
            &SectionsPatch {
                sections: &sections,
            },
        )
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn products(&self) -> Result<Vec<Product>, ApiError> {
        self.list("created_at.asc").await
    }

    pub async fn create_product(&self, draft: &NewProduct) -> Result<Option<Product>, ApiError> {
        let created: Vec<Product> = self
            .create(Collection::Products, draft)
            .await?
            .into_rows()?;
        Ok(created.into_iter().next())
    }

    pub async fn update_product(&self, id: &str, patch: &ProductPatch) -> Result<(), ApiError> {
        self.update(Collection::Products, id, patch).await?;
        Ok(())
    }

    pub async fn toggle_product(&self, id: &str, available: bool) -> Result<(), ApiError> {
        let patch = ProductPatch {
            is_available: Some(available),
            ..ProductPatch::default()
        };
        self.update_product(id, &patch).await
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Collection::Products, id).await
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// The restaurant's settings row, if one exists.
    pub async fn settings(&self) -> Result<Option<Settings>, ApiError> {
        let rows: Vec<Settings> = self.list("id.asc").await?;
        Ok(rows.into_iter().next())
    }

    /// Save settings. Updates `existing` when it has an id, otherwise
    /// creates the row; if creation conflicts with a row that already
    /// exists, that row is re-read and updated instead.
    pub async fn save_settings(
        &self,
        existing: Option<&Settings>,
        draft: &Settings,
    ) -> Result<(), ApiError> {
        if let Some(id) = existing.and_then(|s| s.id.as_deref()) {
            self.update(Collection::Settings, id, draft).await?;
            return Ok(());
        }

        match self.create(Collection::Settings, draft).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_conflict() => {
                info!("Settings already exist, updating the stored row");
                // A cached empty list would hide the row the conflict is about.
                self.client.invalidate_collection(Collection::Settings.table());
                let stored = self.settings().await?;
                match stored.as_ref().and_then(|s| s.id.as_deref()) {
                    Some(id) => {
                        self.update(Collection::Settings, id, draft).await?;
                        Ok(())
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Reviews & users
    // ------------------------------------------------------------------

    pub async fn reviews(&self) -> Result<Vec<Review>, ApiError> {
        self.list("created_at.desc").await
    }

    pub async fn approve_review(&self, id: &str) -> Result<(), ApiError> {
        self.update(
            Collection::Reviews,
            id,
            &serde_json::json!({ "is_approved": true }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_review(&self, id: &str) -> Result<(), ApiError> {
        self.remove(Collection::Reviews, id).await
    }

    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.list("full_name.asc").await
    }

    /// Load everything the dashboard shows. Categories and settings come
    /// first; products, reviews and users follow together.
    pub async fn load_all(&self) -> Result<DashboardData, ApiError> {
        let (categories, settings) = futures::try_join!(self.categories(), self.settings())?;
        let (products, reviews, users) =
            futures::try_join!(self.products(), self.reviews(), self.users())?;

        let data = DashboardData {
            categories,
            products,
            settings,
            reviews,
            users,
        };
        debug!(stats = ?data.stats(), "Dashboard loaded");
        Ok(data)
    }
}

/// Snapshot of everything on the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardData {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub settings: Option<Settings>,
    pub reviews: Vec<Review>,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub categories: usize,
    pub products: usize,
    pub reviews: usize,
    pub approved_reviews: usize,
    pub users: usize,
}

impl DashboardData {
    pub fn stats(&self) -> DashboardStats {
        DashboardStats {
            categories: self.categories.len(),
            products: self.products.len(),
            reviews: self.reviews.len(),
            approved_reviews: self.reviews.iter().filter(|r| r.is_approved).count(),
            users: self.users.len(),
        }
    }

    pub fn products_in_category<'a>(
        &'a self,
        category_id: &'a str,
    ) -> impl Iterator<Item = &'a Product> + 'a {
        self.products
            .iter()
            .filter(move |p| p.category_id == category_id)
    }

    pub fn featured_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.is_featured)
    }

    pub fn reviews_matching(&self, filter: ReviewFilter) -> impl Iterator<Item = &Review> {
        self.reviews.iter().filter(move |r| filter.matches(r))
    }

    /// Categories offered when filing a product.
    pub fn active_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::{MockTransport, Step};
    use crate::cache::{MemoryStore, TieredCache};
    use crate::config::{CacheConfig, ClientConfig};
    use reqwest::Method;
    use std::sync::Arc;
    use std::time::Duration;

    fn api(transport: Arc<MockTransport>) -> RestaurantApi {
        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Arc::new(MemoryStore::default()),
        ));
        let client = RequestClient::new(
            "https://demo.supabase.co",
            "anon-key",
            transport,
            cache,
            ClientConfig::default(),
        );
        RestaurantApi::new(client, Some("r1".to_string()))
    }

    fn category_with_sections(sections: &[&str]) -> Category {
        Category {
            id: "c1".into(),
            name_ar: "سندوتشات".into(),
            is_active: true,
            sections: Some(sections.iter().map(|s| s.to_string()).collect()),
            ..Category::default()
        }
    }

    #[tokio::test]
    async fn test_lists_are_scoped_to_restaurant() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        let api = api(transport.clone());

        api.products().await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            requests[0].url,
            "https://demo.supabase.co/rest/v1/products?restaurant_id=eq.r1&order=created_at.asc"
        );
    }

    #[tokio::test]
    async fn test_create_stamps_restaurant_and_returns_row() {
        let transport = Arc::new(MockTransport::new(Step::ok(
            r#"[{"id":"c9","name_ar":"مشروبات","is_active":true}]"#,
        )));
        let api = api(transport.clone());

        let created = api
            .create_category(&NewCategory::new("مشروبات"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.id, "c9");

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::POST);
        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["restaurant_id"], "r1");
        assert_eq!(body["name_ar"], "مشروبات");
        assert_eq!(body["is_active"], true);
    }

    #[tokio::test]
    async fn test_toggle_product_patches_one_field() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        let api = api(transport.clone());

        api.toggle_product("p1", false).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::PATCH);
        assert!(request.url.ends_with("/products?id=eq.p1"));
        assert_eq!(request.body.as_deref(), Some(r#"{"is_available":false}"#));
    }

    #[tokio::test]
    async fn test_add_section_rejects_duplicates_without_request() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        let api = api(transport.clone());
        let category = category_with_sections(&["Beef"]);

        assert!(!api.add_section(&category, "Beef").await.unwrap());
        assert!(!api.add_section(&category, "   ").await.unwrap());
        assert_eq!(transport.calls(), 0);

        assert!(api.add_section(&category, " Chicken ").await.unwrap());
        assert_eq!(
            transport.requests()[0].body.as_deref(),
            Some(r#"{"sections":["Beef","Chicken"]}"#)
        );
    }

    #[tokio::test]
    async fn test_remove_section() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        let api = api(transport.clone());
        let category = category_with_sections(&["Beef", "Chicken"]);

        api.remove_section(&category, "Beef").await.unwrap();
        assert_eq!(
            transport.requests()[0].body.as_deref(),
            Some(r#"{"sections":["Chicken"]}"#)
        );
    }

    #[tokio::test]
    async fn test_save_settings_updates_known_row() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        let api = api(transport.clone());
        let existing = Settings {
            id: Some("s1".into()),
            ..Settings::default()
        };
        let draft = Settings {
            restaurant_name_ar: "مطعم الشام".into(),
            ..Settings::default()
        };

        api.save_settings(Some(&existing), &draft).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PATCH);
        assert!(requests[0].url.ends_with("/restaurant_settings?id=eq.s1"));
    }

    #[tokio::test]
    async fn test_save_settings_recovers_from_conflict() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        transport.push(Step::status(409, r#"{"code":"23505"}"#));
        transport.push(Step::ok(r#"[{"id":"s7","restaurant_name_ar":"قديم"}]"#));
        let api = api(transport.clone());
        let draft = Settings {
            restaurant_name_ar: "جديد".into(),
            ..Settings::default()
        };

        api.save_settings(None, &draft).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[1].method, Method::GET);
        assert_eq!(requests[2].method, Method::PATCH);
        assert!(requests[2].url.ends_with("/restaurant_settings?id=eq.s7"));
    }

    #[tokio::test]
    async fn test_save_settings_conflict_after_cached_empty_read() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        transport.push(Step::ok("[]"));
        transport.push(Step::status(409, r#"{"code":"23505"}"#));
        transport.push(Step::ok(r#"[{"id":"s7","restaurant_name_ar":"قديم"}]"#));
        let api = api(transport.clone());

        // The dashboard loaded before another session created the row.
        assert_eq!(api.settings().await.unwrap(), None);

        let draft = Settings {
            restaurant_name_ar: "جديد".into(),
            ..Settings::default()
        };
        api.save_settings(None, &draft).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].method, Method::GET);
        assert_eq!(requests[3].method, Method::PATCH);
        assert!(requests[3].url.ends_with("/restaurant_settings?id=eq.s7"));
    }

    #[tokio::test]
    async fn test_save_settings_conflict_without_row_surfaces() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        transport.push(Step::status(409, ""));
        let api = api(transport.clone());

        let err = api
            .save_settings(None, &Settings::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_settings_first_row_or_none() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        let api = api(transport.clone());
        assert_eq!(api.settings().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_approve_review() {
        let transport = Arc::new(MockTransport::new(Step::status(204, "")));
        let api = api(transport.clone());

        api.approve_review("rv1").await.unwrap();
        assert_eq!(
            transport.requests()[0].body.as_deref(),
            Some(r#"{"is_approved":true}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_all_and_stats() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        // Categories and settings are requested first, in that order.
        transport.push(Step::delayed(
            r#"[{"id":"c1","name_ar":"أ","is_active":true},{"id":"c2","name_ar":"ب","is_active":false}]"#,
            Duration::from_millis(20),
        ));
        transport.push(Step::ok(r#"[{"id":"s1","restaurant_name_ar":"مطعم"}]"#));
        transport.push(Step::ok(
            r#"[{"id":"p1","category_id":"c1","name_ar":"x","price":10,"is_featured":true},{"id":"p2","category_id":"c2","name_ar":"y","price":20}]"#,
        ));
        transport.push(Step::ok(
            r#"[{"id":"r1","is_approved":true},{"id":"r2","is_approved":false}]"#,
        ));
        transport.push(Step::ok(r#"[{"id":"u1","role":"admin"}]"#));
        let api = api(transport.clone());

        let data = api.load_all().await.unwrap();

        assert_eq!(transport.calls(), 5);
        assert_eq!(
            data.stats(),
            DashboardStats {
                categories: 2,
                products: 2,
                reviews: 2,
                approved_reviews: 1,
                users: 1,
            }
        );
        assert_eq!(data.settings.as_ref().and_then(|s| s.id.as_deref()), Some("s1"));
        assert_eq!(data.products_in_category("c2").count(), 1);
        assert_eq!(data.featured_products().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["p1"]);
        assert_eq!(data.reviews_matching(ReviewFilter::Pending).count(), 1);
        assert_eq!(data.active_categories().count(), 1);
    }

    #[tokio::test]
    async fn test_load_all_propagates_failure() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        transport.push(Step::status(401, r#"{"message":"JWT expired"}"#));
        let api = api(transport.clone());

        let err = api.load_all().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_write_refreshes_next_list() {
        let transport = Arc::new(MockTransport::new(Step::ok("[]")));
        let api = api(transport.clone());

        api.reviews().await.unwrap();
        api.reviews().await.unwrap();
        assert_eq!(transport.calls(), 1);

        transport.push(Step::status(204, ""));
        api.delete_review("rv1").await.unwrap();
        api.reviews().await.unwrap();
        assert_eq!(transport.calls(), 3);
    }
}
