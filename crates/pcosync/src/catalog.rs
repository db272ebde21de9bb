//! The Planning Center endpoints that are synced, and the warehouse tables
//! they land in.

use chrono::{Days, NaiveDate};
use serde_json::{Value, json};

/// BigQuery column types used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Float,
    Integer,
    Timestamp,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Float => "FLOAT",
            Self::Integer => "INTEGER",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub field_type: FieldType,
    /// Attribute (or relationship) name on the API resource.
    pub source: &'static str,
}

impl Column {
    const fn new(name: &'static str, field_type: FieldType, source: &'static str) -> Self {
        Self {
            name,
            field_type,
            source,
        }
    }

    const fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String, name)
    }
}

/// Restricts an endpoint to records whose timestamp attribute falls in the
/// `lookback_days` days before the run date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub attribute: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub name: &'static str,
    /// Path below the API base URL
    pub path: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    /// Columns other than the id column
    pub columns: &'static [Column],
    pub window: Option<DateWindow>,
}

pub const DONATIONS: Endpoint = Endpoint {
    name: "donations",
    path: "giving/v2/donations",
    table: "pco-donations",
    id_column: "donation_id",
    columns: &[
        Column::new("amount", FieldType::Float, "amount_cents"),
        Column::new("completed_date", FieldType::Timestamp, "completed_at"),
        Column::new("status", FieldType::String, "payment_status"),
    ],
    window: Some(DateWindow {
        attribute: "completed_at",
    }),
};

pub const DESIGNATIONS: Endpoint = Endpoint {
    name: "designations",
    path: "giving/v2/designations",
    table: "pco-designations",
    id_column: "designation_id",
    columns: &[
        Column::string("name"),
        Column::new("fund_id", FieldType::String, "fund"),
    ],
    window: None,
};

pub const FUNDS: Endpoint = Endpoint {
    name: "funds",
    path: "giving/v2/funds",
    table: "pco-funds",
    id_column: "fund_id",
    columns: &[Column::string("name")],
    window: None,
};

pub const CAMPUSES: Endpoint = Endpoint {
    name: "campuses",
    path: "giving/v2/campuses",
    table: "pco-campuses",
    id_column: "campus_id",
    columns: &[Column::string("name")],
    window: None,
};

pub const DONORS: Endpoint = Endpoint {
    name: "donors",
    path: "people/v2/people",
    table: "pco-donors",
    id_column: "donor_id",
    columns: &[
        Column::string("first_name"),
        Column::string("last_name"),
        Column::string("email"),
    ],
    window: None,
};

/// All synced endpoints, in processing order.
pub const ENDPOINTS: &[Endpoint] = &[DONATIONS, DESIGNATIONS, FUNDS, CAMPUSES, DONORS];

impl Endpoint {
    /// Query parameters restricting the fetch, relative to `today`.
    pub fn filters(&self, today: NaiveDate, lookback_days: u32) -> Vec<(String, String)> {
        let Some(window) = self.window else {
            return Vec::new();
        };
        let start = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        vec![
            (
                format!("where[{}][gte]", window.attribute),
                start.format("%Y-%m-%d").to_string(),
            ),
            (
                format!("where[{}][lt]", window.attribute),
                today.format("%Y-%m-%d").to_string(),
            ),
        ]
    }

    /// BigQuery table schema: the id column first, `REQUIRED`, then the
    /// remaining columns as `NULLABLE`.
    pub fn schema(&self) -> Value {
        let mut fields = vec![json!({
            "name": self.id_column,
            "type": "STRING",
            "mode": "REQUIRED",
        })];
        fields.extend(self.columns.iter().map(|c| {
            json!({
                "name": c.name,
                "type": c.field_type.as_str(),
                "mode": "NULLABLE",
            })
        }));
        json!({ "fields": fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_and_tables() {
        let names: Vec<_> = ENDPOINTS.iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            ["donations", "designations", "funds", "campuses", "donors"]
        );
        assert!(ENDPOINTS.iter().all(|e| e.table.starts_with("pco-")));
    }

    #[test]
    fn only_donations_are_windowed() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            DONATIONS.filters(today, 1),
            vec![
                ("where[completed_at][gte]".to_owned(), "2024-02-29".to_owned()),
                ("where[completed_at][lt]".to_owned(), "2024-03-01".to_owned()),
            ]
        );
        assert!(FUNDS.filters(today, 1).is_empty());
    }

    #[test]
    fn schema_marks_id_required() {
        let schema = DESIGNATIONS.schema();
        let fields = schema["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0]["name"], "designation_id");
        assert_eq!(fields[0]["mode"], "REQUIRED");
        assert_eq!(fields[2]["name"], "fund_id");
        assert_eq!(fields[2]["mode"], "NULLABLE");
    }

    #[test]
    fn donation_amount_is_float() {
        let schema = DONATIONS.schema();
        assert_eq!(schema["fields"][1]["type"], "FLOAT");
        assert_eq!(schema["fields"][2]["type"], "TIMESTAMP");
    }
}
