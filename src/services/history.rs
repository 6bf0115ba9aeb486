use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::errors::ServiceError;
use crate::models::{ProductId, SalesRecord, StoreId};

/// Source of historical sales records for a (store, product) pair.
///
/// Implementations return records sorted ascending by date, restricted to
/// `[start, end)`. Failures surface as `DataSourceError`; nothing here
/// retries.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch(
        &self,
        store_id: &StoreId,
        product_id: &ProductId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SalesRecord>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct SalesEnvelope {
    #[serde(default)]
    results: Vec<RawSalesRow>,
}

/// Row shape of the upstream sales API. Store and product live in nested
/// reference objects; `nsv` (net sales value) doubles as revenue.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSalesRow {
    plant: Option<PlantRef>,
    material_code: Option<MaterialRef>,
    date: String,
    quantity: i64,
    nsv: Decimal,
    #[serde(default)]
    discount: f64,
    #[serde(default)]
    is_festival: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlantRef {
    store_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterialRef {
    style_code: Option<String>,
}

impl RawSalesRow {
    fn matches(&self, store_id: &StoreId, product_id: &ProductId) -> bool {
        let row_store = self.plant.as_ref().and_then(|p| p.store_id.as_deref());
        let row_product = self
            .material_code
            .as_ref()
            .and_then(|m| m.style_code.as_deref());
        row_store == Some(store_id.as_str()) && row_product == Some(product_id.as_str())
    }

    fn into_record(
        self,
        store_id: &StoreId,
        product_id: &ProductId,
    ) -> Result<SalesRecord, ServiceError> {
        let date = DateTime::parse_from_rfc3339(&self.date)
            .map_err(|e| {
                ServiceError::DataSourceError(format!(
                    "malformed sales payload: bad date {:?}: {}",
                    self.date, e
                ))
            })?
            .with_timezone(&Utc);

        if self.quantity < 0 {
            return Err(ServiceError::DataSourceError(format!(
                "malformed sales payload: negative quantity {}",
                self.quantity
            )));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ServiceError::DataSourceError(format!(
                "malformed sales payload: discount {} outside [0, 1]",
                self.discount
            )));
        }

        Ok(SalesRecord {
            store_id: store_id.clone(),
            product_id: product_id.clone(),
            date,
            quantity: self.quantity,
            revenue: self.nsv,
            discount: self.discount,
            is_festival: self.is_festival,
        })
    }
}

/// HTTP client for the upstream sales API.
///
/// The upstream endpoint does not filter server-side, so records are
/// filtered by pair and date range after fetching.
pub struct HttpHistoryProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHistoryProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                ServiceError::InternalError("history API key contains invalid characters".into())
            })?;
            headers.insert(AUTHORIZATION, value);
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HistoryProvider for HttpHistoryProvider {
    async fn fetch(
        &self,
        store_id: &StoreId,
        product_id: &ProductId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SalesRecord>, ServiceError> {
        let url = format!("{}/sales", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            ServiceError::DataSourceError(format!("sales API unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::DataSourceError(format!(
                "sales API returned {}",
                status
            )));
        }

        let envelope: SalesEnvelope = response.json().await.map_err(|e| {
            ServiceError::DataSourceError(format!("malformed sales payload: {}", e))
        })?;

        let mut records = Vec::new();
        for row in envelope.results {
            if !row.matches(store_id, product_id) {
                continue;
            }
            let record = row.into_record(store_id, product_id)?;
            if record.date >= start && record.date < end {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.date);

        info!(
            store_id = %store_id,
            product_id = %product_id,
            count = records.len(),
            "Fetched sales records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pair() -> (StoreId, ProductId) {
        (
            StoreId::parse("STORE001").unwrap(),
            ProductId::parse("PROD-1").unwrap(),
        )
    }

    fn raw_row(store: &str, product: &str, date: &str) -> RawSalesRow {
        RawSalesRow {
            plant: Some(PlantRef {
                store_id: Some(store.to_string()),
            }),
            material_code: Some(MaterialRef {
                style_code: Some(product.to_string()),
            }),
            date: date.to_string(),
            quantity: 5,
            nsv: Decimal::new(12050, 2),
            discount: 0.1,
            is_festival: false,
        }
    }

    #[test]
    fn envelope_parses_nested_payload() {
        let payload = r#"{
            "results": [{
                "plant": {"storeId": "STORE001"},
                "materialCode": {"styleCode": "PROD-1"},
                "date": "2024-06-15T00:00:00Z",
                "quantity": 7,
                "nsv": 140.5,
                "discount": 0.25
            }]
        }"#;
        let envelope: SalesEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.results.len(), 1);
        assert_eq!(envelope.results[0].quantity, 7);
        assert!(!envelope.results[0].is_festival);
    }

    #[test]
    fn rows_for_other_pairs_do_not_match() {
        let (store, product) = pair();
        assert!(raw_row("STORE001", "PROD-1", "2024-06-15T00:00:00Z").matches(&store, &product));
        assert!(!raw_row("STORE002", "PROD-1", "2024-06-15T00:00:00Z").matches(&store, &product));
        assert!(!raw_row("STORE001", "PROD-2", "2024-06-15T00:00:00Z").matches(&store, &product));
    }

    #[test]
    fn conversion_parses_date_and_fields() {
        let (store, product) = pair();
        let record = raw_row("STORE001", "PROD-1", "2024-06-15T08:30:00Z")
            .into_record(&store, &product)
            .unwrap();
        assert_eq!(
            record.date,
            Utc.with_ymd_and_hms(2024, 6, 15, 8, 30, 0).unwrap()
        );
        assert_eq!(record.quantity, 5);
        assert_eq!(record.discount, 0.1);
    }

    #[test]
    fn malformed_rows_are_data_source_errors() {
        let (store, product) = pair();

        let bad_date = raw_row("STORE001", "PROD-1", "June 15th");
        assert!(matches!(
            bad_date.into_record(&store, &product),
            Err(ServiceError::DataSourceError(_))
        ));

        let mut bad_quantity = raw_row("STORE001", "PROD-1", "2024-06-15T00:00:00Z");
        bad_quantity.quantity = -3;
        assert!(matches!(
            bad_quantity.into_record(&store, &product),
            Err(ServiceError::DataSourceError(_))
        ));

        let mut bad_discount = raw_row("STORE001", "PROD-1", "2024-06-15T00:00:00Z");
        bad_discount.discount = 1.5;
        assert!(matches!(
            bad_discount.into_record(&store, &product),
            Err(ServiceError::DataSourceError(_))
        ));
    }
}
