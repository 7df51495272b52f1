//! Postgres-backed employee store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique / not-null / check violation) | `23505` / `23502` / `23514` | `Constraint` |
//! | Database (numeric overflow) | `22003` | `Constraint` |
//! | Database (other) | Any other | `Other` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` |
//! | Other | N/A | `Other` |

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument, warn};

use emphub_core::{Employee, EmployeeId, NewEmployee, ValidEmployee};

use super::r#trait::{EmployeeStore, StoreError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS employees (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        department TEXT NOT NULL DEFAULT '',
        hire_date DATE NOT NULL,
        salary NUMERIC(18,2) NOT NULL,
        phone_number TEXT NOT NULL
    )
"#;

/// Postgres employee table (`employees`).
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store can be shared
/// freely behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PostgresEmployeeStore {
    pool: Arc<PgPool>,
}

impl PostgresEmployeeStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `employees` table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmployeeStore for PostgresEmployeeStore {
    #[instrument(skip(self, employee), fields(employee_id), err)]
    async fn insert(&self, employee: ValidEmployee) -> Result<Employee, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO employees (name, email, department, hire_date, salary, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(employee.name())
        .bind(employee.email().as_str())
        .bind(employee.department())
        .bind(employee.hire_date())
        .bind(employee.salary().amount())
        .bind(employee.phone_number().as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("insert", e))?;
        Span::current().record("employee_id", id);

        Ok(employee.with_id(EmployeeId::new(id)))
    }

    #[instrument(skip(self), fields(row_count, skipped_rows), err)]
    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, department, hire_date, salary, phone_number
            FROM employees
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        let rows = rows
            .iter()
            .map(|row| EmployeeRow::from_row(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Corrupt(format!("failed to decode employee row: {e}")))?;

        let total = rows.len();
        let employees = keep_valid_rows(rows);
        Span::current().record("row_count", employees.len());
        Span::current().record("skipped_rows", total - employees.len());
        Ok(employees)
    }
}

#[derive(Debug)]
struct EmployeeRow {
    id: i64,
    name: String,
    email: String,
    department: String,
    hire_date: NaiveDate,
    salary: Decimal,
    phone_number: String,
}

impl<'r> FromRow<'r, PgRow> for EmployeeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            department: row.try_get("department")?,
            hire_date: row.try_get("hire_date")?,
            salary: row.try_get("salary")?,
            phone_number: row.try_get("phone_number")?,
        })
    }
}

impl EmployeeRow {
    /// Rows are re-validated on the way out; a row written by another tool that
    /// breaks the domain rules surfaces as `Corrupt` instead of a bad entity.
    fn into_employee(self) -> Result<Employee, StoreError> {
        let id = self.id;
        let valid = NewEmployee {
            name: self.name,
            email: self.email,
            department: self.department,
            hire_date: Some(self.hire_date),
            salary: self.salary,
            phone_number: self.phone_number,
        }
        .validate()
        .map_err(|e| StoreError::Corrupt(format!("employee {id}: {e}")))?;
        Ok(valid.with_id(EmployeeId::new(id)))
    }
}

/// Rows that fail re-validation are logged and left out so one bad row does
/// not hide the rest of the table.
fn keep_valid_rows(rows: Vec<EmployeeRow>) -> Vec<Employee> {
    rows.into_iter()
        .filter_map(|row| match row.into_employee() {
            Ok(employee) => Some(employee),
            Err(err) => {
                warn!(error = %err, "skipping invalid employee row");
                None
            }
        })
        .collect()
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505" | "23502" | "23514" | "22003") => StoreError::Constraint(msg),
                _ => StoreError::Other(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {}: {}", operation, e)),
        _ => StoreError::Other(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(email: &str) -> EmployeeRow {
        EmployeeRow {
            id: 7,
            name: "A".into(),
            email: email.into(),
            department: "IT".into(),
            hire_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            salary: Decimal::new(5_000_000, 2),
            phone_number: "+15551234567".into(),
        }
    }

    #[test]
    fn row_maps_to_employee() {
        let employee = row("a@b.com").into_employee().unwrap();
        assert_eq!(employee.id_typed(), EmployeeId::new(7));
        assert_eq!(employee.salary().to_string(), "50000.00");
    }

    #[test]
    fn invalid_row_is_reported_as_corrupt() {
        match row("broken").into_employee() {
            Err(StoreError::Corrupt(msg)) => assert!(msg.contains("employee 7")),
            other => panic!("expected corrupt row error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_rows_are_skipped_and_the_rest_listed() {
        let mut good_first = row("a@b.com");
        good_first.id = 1;
        let mut bad = row("broken");
        bad.id = 2;
        let mut good_last = row("c@d.com");
        good_last.id = 3;

        let listed = keep_valid_rows(vec![good_first, bad, good_last]);
        let ids: Vec<_> = listed.iter().map(|e| e.id_typed()).collect();
        assert_eq!(ids, vec![EmployeeId::new(1), EmployeeId::new(3)]);
        assert_eq!(listed[1].email().as_str(), "c@d.com");
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error("list", sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("list", sqlx::Error::RowNotFound),
            StoreError::Other(_)
        ));
    }
}
