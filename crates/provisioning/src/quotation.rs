//! Quotations: the commercial offer a work order is provisioned from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, QuotationId, WorkOrderId};
use doc_store::{Document, DocumentQuery, DocumentStore, DocumentStoreExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ProvisioningError, Result};
use crate::requirements::{RawRequirement, RequirementSource, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    #[default]
    Enquired,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub quote_number: String,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub cable_length: Decimal,
    pub status: QuotationStatus,
    /// Calculator output the work order is provisioned from.
    #[serde(default)]
    pub requirements: Vec<RawRequirement>,
    /// Set when a work order has been provisioned from this quotation.
    #[serde(default)]
    pub work_order_id: Option<WorkOrderId>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Quotation {
    type Id = QuotationId;
    const COLLECTION: &'static str = "quotations";

    fn id(&self) -> QuotationId {
        self.id
    }
}

fn default_cable_length() -> Decimal {
    Decimal::ONE_HUNDRED
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuotation {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Metres of cable quoted.
    #[serde(default = "default_cable_length")]
    pub cable_length: Decimal,
    #[serde(default)]
    pub status: QuotationStatus,
    #[serde(default)]
    pub requirements: Vec<RawRequirement>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct Quotations<S> {
    store: S,
}

impl<S: DocumentStore + Clone> Quotations<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stores a quotation. Malformed requirements are rejected before
    /// anything is written.
    pub async fn create_quotation(&self, input: NewQuotation) -> Result<Quotation> {
        if input.cable_length <= Decimal::ZERO {
            return Err(ProvisioningError::validation(
                "cable length must be positive",
            ));
        }
        normalize(&input.requirements)?;

        let existing = self.store.count::<Quotation>(DocumentQuery::new()).await?;
        let now = Utc::now();
        let quotation = Quotation {
            id: QuotationId::new(),
            quote_number: format!("QT-{:05}", existing + 1),
            customer_id: input.customer_id,
            cable_length: input.cable_length,
            status: input.status,
            requirements: input.requirements,
            work_order_id: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&quotation).await?;

        info!(quote_number = %quotation.quote_number, "quotation created");
        Ok(quotation)
    }

    pub async fn get_quotation(&self, id: QuotationId) -> Result<Quotation> {
        Ok(self.store.get_required::<Quotation>(id).await?.document)
    }
}

#[async_trait]
impl<S: DocumentStore + Clone> RequirementSource for Quotations<S> {
    async fn requirements_for(&self, quotation_id: QuotationId) -> Result<Vec<RawRequirement>> {
        Ok(self.get_quotation(quotation_id).await?.requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MaterialId;
    use doc_store::InMemoryDocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn quote_numbers_increment() {
        let quotations = Quotations::new(InMemoryDocumentStore::new());
        let input = NewQuotation {
            customer_id: None,
            cable_length: Decimal::from(250),
            status: QuotationStatus::Approved,
            requirements: vec![],
            notes: None,
        };

        let first = quotations.create_quotation(input.clone()).await.unwrap();
        let second = quotations.create_quotation(input).await.unwrap();

        assert_eq!(first.quote_number, "QT-00001");
        assert_eq!(second.quote_number, "QT-00002");
        assert!(first.work_order_id.is_none());
        assert_eq!(
            quotations.get_quotation(first.id).await.unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn missing_quotation_is_not_found() {
        let quotations = Quotations::new(InMemoryDocumentStore::new());
        let result = quotations.get_quotation(QuotationId::new()).await;
        assert!(matches!(
            result,
            Err(ProvisioningError::NotFound {
                entity: "Quotation",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn zero_length_is_rejected() {
        let quotations = Quotations::new(InMemoryDocumentStore::new());
        let result = quotations
            .create_quotation(NewQuotation {
                customer_id: None,
                cable_length: Decimal::ZERO,
                status: QuotationStatus::default(),
                requirements: vec![],
                notes: None,
            })
            .await;
        assert!(matches!(result, Err(ProvisioningError::Validation(_))));
    }

    #[tokio::test]
    async fn requirements_are_read_back_from_the_store() {
        let store = InMemoryDocumentStore::new();
        let copper = MaterialId::new();
        let created = Quotations::new(store.clone())
            .create_quotation(NewQuotation {
                customer_id: None,
                cable_length: Decimal::from(100),
                status: QuotationStatus::Approved,
                requirements: vec![RawRequirement {
                    material_id: copper.to_string(),
                    required_weight: Some(json!(12.5)),
                    material_name: Some("Copper".to_string()),
                }],
                notes: None,
            })
            .await
            .unwrap();

        // a fresh handle over the same store sees what was recorded
        let source = Quotations::new(store);
        let requirements = source.requirements_for(created.id).await.unwrap();
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].material_id, copper.to_string());

        let missing = source.requirements_for(QuotationId::new()).await;
        assert!(matches!(missing, Err(ProvisioningError::NotFound { .. })));
    }

    #[tokio::test]
    async fn malformed_requirements_store_nothing() {
        let store = InMemoryDocumentStore::new();
        let result = Quotations::new(store.clone())
            .create_quotation(NewQuotation {
                customer_id: None,
                cable_length: Decimal::from(100),
                status: QuotationStatus::Approved,
                requirements: vec![RawRequirement {
                    material_id: "copper".to_string(),
                    required_weight: Some(json!(1)),
                    material_name: None,
                }],
                notes: None,
            })
            .await;

        assert!(matches!(result, Err(ProvisioningError::Validation(_))));
        assert_eq!(store.count::<Quotation>(DocumentQuery::new()).await.unwrap(), 0);
    }
}
