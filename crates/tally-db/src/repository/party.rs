//! # Party Repository
//!
//! Customers and suppliers. Only as much as the ledgers need: a name, an
//! optional phone number, and existence checks for the engine.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerResult};
use tally_core::validation::validate_party_name;
use tally_core::{Customer, NewParty, Supplier};

/// Whether a customer id exists.
pub async fn customer_exists(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Whether a supplier id exists.
pub async fn supplier_exists(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM suppliers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Repository for customers and suppliers.
#[derive(Debug, Clone)]
pub struct PartyRepository {
    pool: SqlitePool,
}

impl PartyRepository {
    /// Creates a new PartyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PartyRepository { pool }
    }

    pub async fn insert_customer(&self, party: &NewParty) -> LedgerResult<Customer> {
        validate_party_name(&party.name)?;
        debug!(name = %party.name, "Inserting customer");

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, phone, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id, name, phone, created_at
            "#,
        )
        .bind(party.name.trim())
        .bind(party.phone.as_deref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(customer)
    }

    pub async fn insert_supplier(&self, party: &NewParty) -> LedgerResult<Supplier> {
        validate_party_name(&party.name)?;
        debug!(name = %party.name, "Inserting supplier");

        let supplier = sqlx::query_as::<_, Supplier>(
            r#"
            INSERT INTO suppliers (name, phone, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id, name, phone, created_at
            "#,
        )
        .bind(party.name.trim())
        .bind(party.phone.as_deref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(supplier)
    }

    pub async fn get_customer(&self, id: i64) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, phone, created_at FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    pub async fn get_supplier(&self, id: i64) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>(
            "SELECT id, name, phone, created_at FROM suppliers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(supplier)
    }

    pub async fn list_suppliers(&self) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT id, name, phone, created_at FROM suppliers ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(suppliers)
    }

    pub async fn count_customers(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::ErrorKind;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let supplier = db
            .parties()
            .insert_supplier(&NewParty::new("أحمد محمد").with_phone("01234567890"))
            .await
            .unwrap();
        let customer = db
            .parties()
            .insert_customer(&NewParty::new("عميل نقدي"))
            .await
            .unwrap();

        assert_eq!(
            db.parties().get_supplier(supplier.id).await.unwrap().map(|s| s.name),
            Some("أحمد محمد".to_string())
        );
        assert!(db.parties().get_customer(customer.id).await.unwrap().is_some());
        assert_eq!(db.parties().count_customers().await.unwrap(), 1);

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(supplier_exists(&mut conn, supplier.id).await.unwrap());
        assert!(!supplier_exists(&mut conn, supplier.id + 100).await.unwrap());
        assert!(customer_exists(&mut conn, customer.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .parties()
            .insert_customer(&NewParty::new("  "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
