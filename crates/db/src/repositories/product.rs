use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use shopchat_core::domain::product::{ProductId, ProductRef};

use super::{ProductCatalog, StoreError};
use crate::DbPool;

pub struct SqlProductCatalog {
    pool: DbPool,
}

impl SqlProductCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a product by id. Codes are stored upper-cased.
    pub async fn upsert(&self, product: &ProductRef, active: bool) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO product (id, code, name, price, active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 code = excluded.code,
                 name = excluded.name,
                 price = excluded.price,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(product.code.trim().to_ascii_uppercase())
        .bind(&product.name)
        .bind(product.price.to_string())
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<ProductRef, StoreError> {
    let id: String = row.try_get("id").map_err(|e| StoreError::Decode(e.to_string()))?;
    let code: String = row.try_get("code").map_err(|e| StoreError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| StoreError::Decode(e.to_string()))?;
    let price: String = row.try_get("price").map_err(|e| StoreError::Decode(e.to_string()))?;
    let price = Decimal::from_str(&price)
        .map_err(|e| StoreError::Decode(format!("product `{id}` price `{price}`: {e}")))?;

    Ok(ProductRef::new(id, code, name, price))
}

#[async_trait::async_trait]
impl ProductCatalog for SqlProductCatalog {
    async fn find_by_code(&self, code: &str) -> Result<Option<ProductRef>, StoreError> {
        let row = sqlx::query(
            "SELECT id, code, name, price FROM product WHERE code = ? AND active = 1",
        )
        .bind(code.trim().to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_by_id(&self, id: &ProductId) -> Result<Option<ProductRef>, StoreError> {
        let row = sqlx::query("SELECT id, code, name, price FROM product WHERE id = ? AND active = 1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use shopchat_core::domain::product::{ProductId, ProductRef};

    use super::SqlProductCatalog;
    use crate::repositories::ProductCatalog;
    use crate::{connect_with_settings, migrations};

    async fn catalog() -> SqlProductCatalog {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlProductCatalog::new(pool)
    }

    #[tokio::test]
    async fn lookups_by_code_and_id_keep_decimal_price() {
        let catalog = catalog().await;
        let product =
            ProductRef::new("p-1", "GLD-NCK-001", "สร้อยคอทองคำ", Decimal::new(1_250_050, 2));
        catalog.upsert(&product, true).await.expect("upsert");

        let by_code = catalog.find_by_code("gld-nck-001").await.expect("find by code");
        assert_eq!(by_code, Some(product.clone()));
        let by_id = catalog.find_by_id(&ProductId("p-1".to_string())).await.expect("find by id");
        assert_eq!(by_id.map(|found| found.price), Some(Decimal::new(1_250_050, 2)));
    }

    #[tokio::test]
    async fn inactive_products_do_not_resolve() {
        let catalog = catalog().await;
        let product = ProductRef::new("p-2", "RLX-SUB-001", "Rolex Submariner", Decimal::new(450_000, 0));
        catalog.upsert(&product, false).await.expect("upsert");

        assert_eq!(catalog.find_by_code("RLX-SUB-001").await.expect("find"), None);
    }
}
