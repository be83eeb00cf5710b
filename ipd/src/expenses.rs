// ipd/src/expenses.rs

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use models::{Expense, HospitalError};
use storage_api::{tables, Query, RowStore};

#[derive(Debug, Deserialize)]
pub struct NewExpense {
    pub category: String,
    pub description: Option<String>,
    /// Minor currency units; must be positive.
    pub amount: i64,
    pub incurred_on: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseUpdate {
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount: Option<i64>,
    pub incurred_on: Option<NaiveDate>,
}

pub struct ExpenseService {
    store: Arc<dyn RowStore>,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        ExpenseService { store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Expense, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::EXPENSES).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("expense {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    /// Expenses newest-first.
    pub async fn list(&self) -> Result<Vec<Expense>, HospitalError> {
        let rows = self
            .store
            .select(Query::table(tables::EXPENSES).order_by("incurred_on", false))
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    pub async fn create(&self, new: NewExpense) -> Result<Expense, HospitalError> {
        if new.category.trim().is_empty() {
            return Err(HospitalError::validation("expense category is required"));
        }
        if new.amount <= 0 {
            return Err(HospitalError::validation("expense amount must be positive"));
        }
        let now = Utc::now();
        let row = json!({
            "category": new.category.trim(),
            "description": new.description,
            "amount": new.amount,
            "incurred_on": new.incurred_on,
            "created_at": now,
            "updated_at": now,
        });
        let stored = self.store.insert(tables::EXPENSES, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn update(&self, id: Uuid, update: ExpenseUpdate) -> Result<Expense, HospitalError> {
        self.get(id).await?;
        let mut patch = serde_json::Map::new();
        if let Some(category) = update.category {
            if category.trim().is_empty() {
                return Err(HospitalError::validation("expense category is required"));
            }
            patch.insert("category".into(), json!(category.trim()));
        }
        if let Some(amount) = update.amount {
            if amount <= 0 {
                return Err(HospitalError::validation("expense amount must be positive"));
            }
            patch.insert("amount".into(), json!(amount));
        }
        if let Some(v) = update.description {
            patch.insert("description".into(), json!(v));
        }
        if let Some(v) = update.incurred_on {
            patch.insert("incurred_on".into(), json!(v));
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        let row = self
            .store
            .update(tables::EXPENSES, id, serde_json::Value::Object(patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        self.get(id).await?;
        self.store.delete(tables::EXPENSES, id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_api::InMemoryBackend;

    #[tokio::test]
    async fn should_reject_non_positive_amounts() {
        let service = ExpenseService::new(Arc::new(InMemoryBackend::new()));
        let refused = service
            .create(NewExpense {
                category: "Supplies".into(),
                description: None,
                amount: 0,
                incurred_on: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            })
            .await;
        assert!(matches!(refused, Err(HospitalError::Validation(_))));
    }

    #[tokio::test]
    async fn should_list_newest_first() {
        let service = ExpenseService::new(Arc::new(InMemoryBackend::new()));
        for (day, category) in [(1, "Supplies"), (15, "Maintenance")] {
            service
                .create(NewExpense {
                    category: category.into(),
                    description: None,
                    amount: 5_000,
                    incurred_on: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
                })
                .await
                .unwrap();
        }
        let expenses = service.list().await.unwrap();
        assert_eq!(expenses[0].category, "Maintenance");
        assert_eq!(expenses[1].category, "Supplies");
    }
}
