use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use shopchat_core::domain::address::{Address, AddressId};

use super::{AddressStore, StoreError};
use crate::DbPool;

pub struct SqlAddressStore {
    pool: DbPool,
}

impl SqlAddressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_address(row: &sqlx::sqlite::SqliteRow) -> Result<Address, StoreError> {
    let column = |name: &str| -> Result<String, StoreError> {
        row.try_get(name).map_err(|e| StoreError::Decode(e.to_string()))
    };
    Ok(Address {
        name: column("name")?,
        phone: column("phone")?,
        line1: column("line1")?,
        subdistrict: column("subdistrict")?,
        district: column("district")?,
        province: column("province")?,
        postal_code: column("postal_code")?,
    })
}

#[async_trait::async_trait]
impl AddressStore for SqlAddressStore {
    /// Blank columns are filled with placeholders before insert.
    async fn save(&self, address: &Address, customer_ref: &str) -> Result<AddressId, StoreError> {
        let id = Uuid::new_v4().to_string();
        let address = address.clone().with_storage_defaults();

        sqlx::query(
            "INSERT INTO customer_address (id, customer_ref, name, phone, line1, subdistrict,
                                           district, province, postal_code, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(customer_ref)
        .bind(&address.name)
        .bind(&address.phone)
        .bind(&address.line1)
        .bind(&address.subdistrict)
        .bind(&address.district)
        .bind(&address.province)
        .bind(&address.postal_code)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AddressId(id))
    }

    async fn list_for_customer(&self, customer_ref: &str) -> Result<Vec<Address>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, phone, line1, subdistrict, district, province, postal_code
             FROM customer_address WHERE customer_ref = ? ORDER BY created_at ASC",
        )
        .bind(customer_ref)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_address).collect()
    }
}
