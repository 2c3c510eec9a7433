use ledgerfold_core::{Money, Record, DATE_FORMAT};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const TAG_VIEW: &str = "spending_per_tag";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Amount {0} does not fit in integer cents")]
    AmountOutOfRange(Money),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTotalRow {
    pub tag: String,
    pub total_cents: i64,
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    Ok(pool)
}

/// In-memory database, for tests and dry runs.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
}

/// Replaces the audit table with `records` and rebuilds the per-tag view.
pub async fn write_audit<'a, I>(pool: &DbPool, records: &[Record], tag_names: I) -> Result<(), AuditError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP VIEW IF EXISTS {TAG_VIEW}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {TRANSACTIONS_TABLE}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        r#"
        CREATE TABLE {TRANSACTIONS_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            amount TEXT,
            amount_cents INTEGER,
            description TEXT NOT NULL,
            description_structured TEXT NOT NULL,
            details TEXT NOT NULL,
            counterparty_name TEXT NOT NULL,
            counterparty_account TEXT NOT NULL,
            provider TEXT NOT NULL,
            account TEXT NOT NULL,
            source_file TEXT NOT NULL,
            tags TEXT NOT NULL,
            memo TEXT,
            amount_display TEXT,
            payee TEXT
        )
        "#
    ))
    .execute(&mut *tx)
    .await?;

    let insert = format!(
        "INSERT INTO {TRANSACTIONS_TABLE} (date, amount, amount_cents, description, description_structured, details, \
         counterparty_name, counterparty_account, provider, account, source_file, tags, memo, amount_display, payee) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    for r in records {
        let cents = r
            .amount
            .map(|amount| amount.to_cents().ok_or(AuditError::AmountOutOfRange(amount)))
            .transpose()?;
        sqlx::query(&insert)
            .bind(r.date.format(DATE_FORMAT).to_string())
            .bind(r.amount.map(|amount| amount.to_string()))
            .bind(cents)
            .bind(&r.description)
            .bind(&r.description_structured)
            .bind(&r.details)
            .bind(&r.counterparty_name)
            .bind(&r.counterparty_account)
            .bind(&r.provider)
            .bind(&r.account)
            .bind(&r.source_file)
            .bind(r.tags_joined())
            .bind(r.memo.as_deref())
            .bind(r.amount_display.as_deref())
            .bind(r.payee.as_deref())
            .execute(&mut *tx)
            .await?;
    }

    if let Some(view) = tag_view_sql(tag_names) {
        sqlx::query(&view).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!(records = records.len(), "Wrote audit table");
    Ok(())
}

/// `CREATE VIEW` with one row per known tag, or `None` when there are no tags.
fn tag_view_sql<'a, I>(tag_names: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tags: Vec<&str> = tag_names.into_iter().collect();
    tags.sort_unstable();
    tags.dedup();
    if tags.is_empty() {
        return None;
    }

    let clauses: Vec<String> = tags
        .iter()
        .map(|tag| {
            format!(
                "SELECT '{}' AS tag, COALESCE(SUM(amount_cents), 0) AS total_cents FROM {TRANSACTIONS_TABLE} \
                 WHERE tags LIKE '%{}%' ESCAPE '\\'",
                quote(tag),
                quote(&escape_like(tag)),
            )
        })
        .collect();
    Some(format!("CREATE VIEW {TAG_VIEW} AS {}", clauses.join(" UNION ALL ")))
}

fn quote(s: &str) -> String {
    s.replace('\'', "''")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub async fn get_tag_totals(pool: &DbPool) -> Result<Vec<TagTotalRow>, sqlx::Error> {
    let exists = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view' AND name = ?",
    )
    .bind(TAG_VIEW)
    .fetch_one(pool)
    .await?;
    if exists.0 == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT tag, total_cents FROM {TAG_VIEW} ORDER BY tag"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(tag, total_cents)| TagTotalRow { tag, total_cents })
        .collect())
}

pub async fn count_records(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(&format!("SELECT COUNT(*) FROM {TRANSACTIONS_TABLE}"))
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerfold_core::Origin;

    fn make_record(account: &str, cents: i64, tags: &[&str]) -> Record {
        let origin = Origin {
            provider: "bankA".to_string(),
            account: account.to_string(),
            source_file: "bankA/a.csv".to_string(),
        };
        let mut r = Record::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(cents),
            &origin,
        );
        r.description = "O'Brien's pub".to_string();
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    #[tokio::test]
    async fn audit_includes_every_record() {
        let pool = create_memory_db().await.unwrap();
        let records = vec![
            make_record("bankA", -1000, &["food"]),
            make_record("paypal", -250, &["seafood", "travel"]),
            make_record("bankA", 5000, &[]),
        ];
        write_audit(&pool, &records, ["travel", "food", "rent"]).await.unwrap();

        assert_eq!(count_records(&pool).await.unwrap(), 3);
        let totals = get_tag_totals(&pool).await.unwrap();
        assert_eq!(
            totals,
            vec![
                TagTotalRow { tag: "food".to_string(), total_cents: -1250 },
                TagTotalRow { tag: "rent".to_string(), total_cents: 0 },
                TagTotalRow { tag: "travel".to_string(), total_cents: -250 },
            ]
        );
    }

    #[tokio::test]
    async fn records_without_amount_are_stored_as_null() {
        let pool = create_memory_db().await.unwrap();
        let mut no_amount = make_record("bankA", 0, &["food"]);
        no_amount.amount = None;
        let records = vec![no_amount, make_record("bankA", -300, &["food"])];
        write_audit(&pool, &records, ["food"]).await.unwrap();

        let nulls = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM transactions WHERE amount_cents IS NULL")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(nulls.0, 1);
        let totals = get_tag_totals(&pool).await.unwrap();
        assert_eq!(totals, vec![TagTotalRow { tag: "food".to_string(), total_cents: -300 }]);
    }

    #[tokio::test]
    async fn rewriting_replaces_previous_contents() {
        let pool = create_memory_db().await.unwrap();
        write_audit(&pool, &[make_record("bankA", 1, &["a"])], ["a"]).await.unwrap();
        write_audit(&pool, &[], std::iter::empty()).await.unwrap();

        assert_eq!(count_records(&pool).await.unwrap(), 0);
        assert!(get_tag_totals(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tag_names_are_escaped() {
        let pool = create_memory_db().await.unwrap();
        let records = vec![make_record("bankA", -100, &["kid's 100%"]), make_record("bankA", -7, &["kids 1000"])];
        write_audit(&pool, &records, ["kid's 100%"]).await.unwrap();

        let totals = get_tag_totals(&pool).await.unwrap();
        assert_eq!(totals, vec![TagTotalRow { tag: "kid's 100%".to_string(), total_cents: -100 }]);
    }

    #[tokio::test]
    async fn create_db_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.sqlite");
        let pool = create_db(&path).await.unwrap();
        write_audit(&pool, &[make_record("bankA", 42, &[])], std::iter::empty()).await.unwrap();
        assert!(path.exists());
        assert_eq!(count_records(&pool).await.unwrap(), 1);
    }

    #[test]
    fn view_sql_is_sorted_and_deduplicated() {
        let sql = tag_view_sql(["b", "a", "b"]).unwrap();
        let a = sql.find("'a' AS tag").unwrap();
        let b = sql.find("'b' AS tag").unwrap();
        assert!(a < b);
        assert_eq!(sql.matches("UNION ALL").count(), 1);
        assert!(tag_view_sql(std::iter::empty()).is_none());
    }
}
