use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use shopchat_core::domain::address::{Address, AddressId};
use shopchat_core::errors::ApplicationError;
use shopchat_core::domain::checkout::CheckoutState;
use shopchat_core::domain::conversation::ConversationKey;
use shopchat_core::domain::product::{ProductId, ProductRef};

pub mod address;
pub mod memory;
pub mod product;
pub mod state;

pub use address::SqlAddressStore;
pub use memory::{InMemoryAddressStore, InMemoryProductCatalog, InMemoryStateStore};
pub use product::SqlProductCatalog;
pub use state::SqlStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Key/value storage with a per-key time to live. An expired key reads as absent.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn save(&self, address: &Address, customer_ref: &str) -> Result<AddressId, StoreError>;
    async fn list_for_customer(&self, customer_ref: &str) -> Result<Vec<Address>, StoreError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<ProductRef>, StoreError>;
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<ProductRef>, StoreError>;
}

/// Typed access to checkout states on top of a [`StateStore`].
pub struct CheckoutStateRepository<S: ?Sized> {
    store: std::sync::Arc<S>,
    ttl_secs: u64,
}

impl<S> CheckoutStateRepository<S>
where
    S: StateStore + ?Sized,
{
    pub fn new(store: std::sync::Arc<S>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// A stored value that no longer decodes reads as "no active checkout".
    pub async fn load(&self, key: &ConversationKey) -> Result<Option<CheckoutState>, StoreError> {
        let storage_key = key.checkout_key();
        let Some(value) = self.store.get(&storage_key).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<CheckoutState>(value) {
            Ok(state) => Ok(Some(state)),
            Err(error) => {
                warn!(
                    event_name = "store.checkout_state_undecodable",
                    key = %storage_key,
                    error = %error,
                    "discarding undecodable checkout state"
                );
                Ok(None)
            }
        }
    }

    pub async fn save(&self, key: &ConversationKey, state: &CheckoutState) -> Result<(), StoreError> {
        let value = serde_json::to_value(state).map_err(|error| StoreError::Decode(error.to_string()))?;
        self.store.set(&key.checkout_key(), value, self.ttl_secs).await
    }

    pub async fn clear(&self, key: &ConversationKey) -> Result<(), StoreError> {
        self.store.delete(&key.checkout_key()).await
    }
}
