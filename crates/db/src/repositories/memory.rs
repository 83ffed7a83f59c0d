use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use shopchat_core::domain::address::{Address, AddressId};
use shopchat_core::domain::product::{ProductId, ProductRef};

use super::{AddressStore, ProductCatalog, StateStore, StoreError};

/// Expiry is `None` when the TTL overflows the clock; such entries never expire.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, (Value, Option<Instant>)>>,
}

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    !matches!(expires_at, Some(expires_at) if expires_at <= now)
}

impl InMemoryStateStore {
    /// Drops expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        purge(&mut entries, Instant::now())
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn purge(entries: &mut HashMap<String, (Value, Option<Instant>)>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, (_, expires_at)| is_live(*expires_at, now));
    before - entries.len()
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| is_live(*expires_at, now))
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now.checked_add(Duration::from_secs(ttl_secs));
        let mut entries = self.entries.write().await;
        let purged = purge(&mut entries, now);
        if purged > 0 {
            tracing::debug!(event_name = "state.expired_purged", purged, "purged expired state entries");
        }
        entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAddressStore {
    addresses: RwLock<Vec<(AddressId, String, Address)>>,
}

#[async_trait::async_trait]
impl AddressStore for InMemoryAddressStore {
    async fn save(&self, address: &Address, customer_ref: &str) -> Result<AddressId, StoreError> {
        let id = AddressId(uuid::Uuid::new_v4().to_string());
        let mut addresses = self.addresses.write().await;
        addresses.push((id.clone(), customer_ref.to_string(), address.clone().with_storage_defaults()));
        Ok(id)
    }

    async fn list_for_customer(&self, customer_ref: &str) -> Result<Vec<Address>, StoreError> {
        let addresses = self.addresses.read().await;
        Ok(addresses
            .iter()
            .filter(|(_, owner, _)| owner == customer_ref)
            .map(|(_, _, address)| address.clone())
            .collect())
    }
}

/// Catalog keyed by product id; code lookups are case-insensitive.
#[derive(Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<String, ProductRef>>,
}

impl InMemoryProductCatalog {
    pub fn with_products(products: impl IntoIterator<Item = ProductRef>) -> Self {
        let products = products.into_iter().map(|product| (product.id.0.clone(), product)).collect();
        Self { products: RwLock::new(products) }
    }

    pub async fn upsert(&self, product: ProductRef) {
        let mut products = self.products.write().await;
        products.insert(product.id.0.clone(), product);
    }

    pub async fn remove(&self, id: &ProductId) {
        let mut products = self.products.write().await;
        products.remove(&id.0);
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_by_code(&self, code: &str) -> Result<Option<ProductRef>, StoreError> {
        let products = self.products.read().await;
        Ok(products.values().find(|product| product.code.eq_ignore_ascii_case(code.trim())).cloned())
    }

    async fn find_by_id(&self, id: &ProductId) -> Result<Option<ProductRef>, StoreError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::json;

    use shopchat_core::domain::address::Address;
    use shopchat_core::domain::product::{ProductId, ProductRef};

    use crate::repositories::{
        AddressStore, InMemoryAddressStore, InMemoryProductCatalog, InMemoryStateStore,
        ProductCatalog, StateStore,
    };

    #[tokio::test(start_paused = true)]
    async fn state_entries_expire_after_ttl() {
        let store = InMemoryStateStore::default();
        store.set("checkout:U1:line", json!({"step": "confirmed"}), 30).await.expect("set");

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.get("checkout:U1:line").await.expect("get").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("checkout:U1:line").await.expect("get").is_none());
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_sweeps_entries_that_already_expired() {
        let store = InMemoryStateStore::default();
        store.set("checkout:U1:line", json!({"step": "confirmed"}), 30).await.expect("set");
        store.set("checkout:U2:line", json!({"step": "selecting_payment"}), 120).await.expect("set");

        tokio::time::advance(Duration::from_secs(31)).await;
        store.set("checkout:U3:line", json!({"step": "selecting_payment"}), 120).await.expect("set");

        assert_eq!(store.entry_count().await, 2);
        assert_eq!(store.purge_expired().await, 0);
        assert!(store.get("checkout:U2:line").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn ttl_beyond_the_clock_range_never_expires() {
        let store = InMemoryStateStore::default();
        store.set("checkout:U1:line", json!({"step": "confirmed"}), u64::MAX).await.expect("set");

        assert_eq!(store.get("checkout:U1:line").await.expect("get"), Some(json!({"step": "confirmed"})));
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn addresses_are_listed_per_customer() {
        let store = InMemoryAddressStore::default();
        let address = Address { phone: "0812345678".to_string(), ..Address::default() };

        store.save(&address, "U1").await.expect("save");
        store.save(&address, "U2").await.expect("save");

        let listed = store.list_for_customer("U1").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "ลูกค้า");
    }

    #[tokio::test]
    async fn catalog_finds_by_code_ignoring_case_and_by_id() {
        let catalog = InMemoryProductCatalog::with_products([ProductRef::new(
            "p-1",
            "RLX-SUB-001",
            "Rolex Submariner",
            Decimal::new(450_000, 0),
        )]);

        let by_code = catalog.find_by_code("rlx-sub-001").await.expect("find by code");
        assert_eq!(by_code.map(|product| product.id), Some(ProductId("p-1".to_string())));

        catalog.remove(&ProductId("p-1".to_string())).await;
        assert!(catalog.find_by_id(&ProductId("p-1".to_string())).await.expect("find").is_none());
    }
}
