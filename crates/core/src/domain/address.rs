use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressId(pub String);

/// Structured shipping address extracted from free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub phone: String,
    pub line1: String,
    pub subdistrict: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
}

impl Address {
    /// Placeholder values used when handing a partially parsed address to storage
    /// that requires every column to be populated.
    pub fn with_storage_defaults(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = "ลูกค้า".to_string();
        }
        if self.district.trim().is_empty() {
            self.district = "-".to_string();
        }
        if self.province.trim().is_empty() {
            self.province = "-".to_string();
        }
        if self.postal_code.trim().is_empty() {
            self.postal_code = "00000".to_string();
        }
        self
    }

    /// Single-line rendering for confirmation summaries.
    pub fn summary_line(&self) -> String {
        [
            self.line1.as_str(),
            self.subdistrict.as_str(),
            self.district.as_str(),
            self.province.as_str(),
            self.postal_code.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    Name,
    Phone,
    Address,
}

impl AddressField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Address => "address",
        }
    }
}
