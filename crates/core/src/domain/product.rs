use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// The slice of a catalog product that a checkout needs to carry around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub price: Decimal,
}

impl ProductRef {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self { id: ProductId(id.into()), code: code.into(), name: name.into(), price }
    }

    /// A checkout can only proceed against a positively priced product.
    pub fn is_sellable(&self) -> bool {
        self.price > Decimal::ZERO
    }

    pub fn label(&self) -> String {
        match (self.code.trim(), self.name.trim()) {
            ("", name) => name.to_string(),
            (code, "") => code.to_string(),
            (code, name) => format!("{code} {name}"),
        }
    }
}
