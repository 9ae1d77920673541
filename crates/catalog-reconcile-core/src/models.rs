//! Core data models shared by the planner, comparator, and dispatchers.
//!
//! [`Record`] is one decoded CSV row; [`ExternalProduct`] and [`CatalogPage`]
//! mirror the catalog service's JSON payload. [`Divergence`] and
//! [`FieldDifference`] are the reconciliation output and serialize to the
//! same JSON shape the upload endpoints return.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One row of the uploaded dataset.
///
/// Serde names match the CSV headers (`id,nome,categoria,preco,estoque,fornecedor`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "preco")]
    pub price: f64,
    #[serde(rename = "estoque")]
    pub stock: i64,
    #[serde(rename = "fornecedor")]
    pub supplier: String,
}

/// One catalog entry as returned by the external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProduct {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "preco")]
    pub price: f64,
    #[serde(rename = "estoque")]
    pub stock: i64,
    #[serde(rename = "fornecedor")]
    pub supplier: String,
}

/// Pagination metadata attached to every catalog page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub items_per_page: u32,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_previous_page: bool,
}

/// A single page of the external catalog.
///
/// A `null` or missing `data` array decodes as an empty page, which the
/// comparator treats as "nothing found".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<ExternalProduct>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl CatalogPage {
    /// Builds a page from products with metadata describing a single page.
    pub fn from_products(page: u32, limit: u32, data: Vec<ExternalProduct>) -> Self {
        let total_items = data.len() as u64;
        Self {
            data,
            pagination: Pagination {
                current_page: page,
                items_per_page: limit,
                total_items,
                total_pages: 1,
                has_next_page: false,
                has_previous_page: page > 1,
            },
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ExternalProduct>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ExternalProduct>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The comparable fields of a record, in comparison order.
///
/// `Existence` is the synthetic marker for a record missing from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Category,
    Price,
    Stock,
    Supplier,
    Existence,
}

impl Field {
    /// Wire name used in `field_name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Category => "Category",
            Field::Price => "Price",
            Field::Stock => "Stock",
            Field::Supplier => "Supplier",
            Field::Existence => "existence",
        }
    }

    /// Parses a wire name back into a field.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "Name" => Some(Field::Name),
            "Category" => Some(Field::Category),
            "Price" => Some(Field::Price),
            "Stock" => Some(Field::Stock),
            "Supplier" => Some(Field::Supplier),
            "existence" => Some(Field::Existence),
            _ => None,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Field::from_wire(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown field name: {}", name)))
    }
}

/// A value on one side of a [`FieldDifference`].
///
/// Serialized untagged, so JSON carries the bare string, number, or bool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Flag(v)
    }
}

/// One mismatched field: the CSV value and the catalog value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub field_name: Field,
    pub csv_value: FieldValue,
    pub api_value: FieldValue,
}

impl FieldDifference {
    pub fn new(
        field: Field,
        csv_value: impl Into<FieldValue>,
        api_value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            field_name: field,
            csv_value: csv_value.into(),
            api_value: api_value.into(),
        }
    }

    /// The `existence` marker: present in the CSV, absent from the catalog.
    pub fn missing_from_catalog() -> Self {
        Self::new(Field::Existence, true, false)
    }
}

/// All differences found for one record identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub record_id: i64,
    pub differences: Vec<FieldDifference>,
}

impl Divergence {
    /// True when this divergence only reports the record as missing.
    pub fn is_missing(&self) -> bool {
        matches!(
            self.differences.as_slice(),
            [FieldDifference {
                field_name: Field::Existence,
                ..
            }]
        )
    }
}
