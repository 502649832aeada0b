use crate::database::connection::{validate_identifier, DatabaseError, PgPooledConnection};
use crate::database::enums::DataType;
use crate::models::{MarketRecord, WriteOutcome};
use chrono::{DateTime, Utc};
use diesel::connection::Connection;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Int4, Nullable, Numeric, Text, Timestamptz};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Series repository trait - target tables receiving fetched records
///
/// Table names come from the registry, so every method validates the name
/// before it is spliced into SQL.
#[async_trait::async_trait]
pub trait SeriesRepository: Send + Sync {
    /// Create the target table with its dedup constraint if it does not exist
    fn ensure_table(&self, data_type: DataType, table: &str) -> Result<(), DatabaseError>;

    /// Latest stored event time for a symbol (None if the symbol has no rows)
    fn latest_event_time(
        &self,
        table: &str,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Insert records whose dedup key is not present yet
    ///
    /// Runs in one transaction; existing keys are counted as skipped.
    fn insert_missing(
        &self,
        data_type: DataType,
        table: &str,
        records: &[MarketRecord],
    ) -> Result<WriteOutcome, DatabaseError>;

    /// Count stored rows for a symbol
    fn count_by_symbol(&self, table: &str, symbol: &str) -> Result<i64, DatabaseError>;
}

/// Concrete implementation of SeriesRepository
pub struct SeriesRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,

    /// Tables already verified in this process
    ensured: Mutex<HashSet<String>>,
}

impl SeriesRepositoryImpl {
    /// Create new series repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// DDL for a target table of the given data type
    fn create_table_sql(data_type: DataType, table: &str) -> String {
        let columns = match data_type {
            DataType::MacroIndicator => "value NUMERIC NOT NULL",
            DataType::CommodityPrice => "close_price NUMERIC NOT NULL",
            DataType::FxIntraday | DataType::FxDaily => {
                "from_symbol VARCHAR(8) NOT NULL, \
                 to_symbol VARCHAR(8) NOT NULL, \
                 open_price NUMERIC NOT NULL, \
                 high_price NUMERIC NOT NULL, \
                 low_price NUMERIC NOT NULL, \
                 close_price NUMERIC NOT NULL"
            }
            DataType::TechnicalIndicator => {
                "indicator VARCHAR(32) NOT NULL, \
                 value NUMERIC NOT NULL, \
                 interval VARCHAR(16) NOT NULL, \
                 time_period INTEGER NOT NULL, \
                 series_type VARCHAR(16) NOT NULL"
            }
            DataType::NewsSentiment => {
                "article_url TEXT NOT NULL, \
                 title TEXT, \
                 topics TEXT NOT NULL, \
                 sentiment_score NUMERIC NOT NULL, \
                 sentiment_label VARCHAR(32) NOT NULL, \
                 relevance_score NUMERIC NOT NULL, \
                 source TEXT, \
                 summary TEXT"
            }
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id BIGSERIAL PRIMARY KEY, \
             symbol VARCHAR(32) NOT NULL, \
             event_time TIMESTAMPTZ NOT NULL, \
             {columns}, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             UNIQUE ({key}))",
            table = table,
            columns = columns,
            key = data_type.dedup_columns().join(", "),
        )
    }

    /// Insert one record, returning 1 if inserted and 0 if its key already exists
    fn insert_record<C>(
        conn: &mut C,
        table: &str,
        conflict: &str,
        record: &MarketRecord,
    ) -> QueryResult<usize>
    where
        C: Connection<Backend = Pg>,
    {
        match record {
            MarketRecord::Macro(point) => diesel::sql_query(format!(
                "INSERT INTO {} (symbol, event_time, value) VALUES ($1, $2, $3) \
                 ON CONFLICT ({}) DO NOTHING",
                table, conflict
            ))
            .bind::<Text, _>(&point.symbol)
            .bind::<Timestamptz, _>(point.event_time)
            .bind::<Numeric, _>(point.value)
            .execute(conn),

            MarketRecord::Commodity(point) => diesel::sql_query(format!(
                "INSERT INTO {} (symbol, event_time, close_price) VALUES ($1, $2, $3) \
                 ON CONFLICT ({}) DO NOTHING",
                table, conflict
            ))
            .bind::<Text, _>(&point.symbol)
            .bind::<Timestamptz, _>(point.event_time)
            .bind::<Numeric, _>(point.value)
            .execute(conn),

            MarketRecord::Fx(bar) => diesel::sql_query(format!(
                "INSERT INTO {} (symbol, event_time, from_symbol, to_symbol, \
                 open_price, high_price, low_price, close_price) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT ({}) DO NOTHING",
                table, conflict
            ))
            .bind::<Text, _>(&bar.symbol)
            .bind::<Timestamptz, _>(bar.event_time)
            .bind::<Text, _>(&bar.from_symbol)
            .bind::<Text, _>(&bar.to_symbol)
            .bind::<Numeric, _>(bar.open_price)
            .bind::<Numeric, _>(bar.high_price)
            .bind::<Numeric, _>(bar.low_price)
            .bind::<Numeric, _>(bar.close_price)
            .execute(conn),

            MarketRecord::Indicator(point) => diesel::sql_query(format!(
                "INSERT INTO {} (symbol, event_time, indicator, value, interval, \
                 time_period, series_type) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT ({}) DO NOTHING",
                table, conflict
            ))
            .bind::<Text, _>(&point.symbol)
            .bind::<Timestamptz, _>(point.event_time)
            .bind::<Text, _>(&point.indicator)
            .bind::<Numeric, _>(point.value)
            .bind::<Text, _>(&point.interval)
            .bind::<Int4, _>(point.time_period)
            .bind::<Text, _>(&point.series_type)
            .execute(conn),

            MarketRecord::News(article) => diesel::sql_query(format!(
                "INSERT INTO {} (symbol, event_time, article_url, title, topics, \
                 sentiment_score, sentiment_label, relevance_score, source, summary) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT ({}) DO NOTHING",
                table, conflict
            ))
            .bind::<Text, _>(&article.symbol)
            .bind::<Timestamptz, _>(article.event_time)
            .bind::<Text, _>(&article.article_url)
            .bind::<Nullable<Text>, _>(article.title.as_deref())
            .bind::<Text, _>(&article.topics)
            .bind::<Numeric, _>(article.sentiment_score)
            .bind::<Text, _>(&article.sentiment_label)
            .bind::<Numeric, _>(article.relevance_score)
            .bind::<Nullable<Text>, _>(article.source.as_deref())
            .bind::<Nullable<Text>, _>(article.summary.as_deref())
            .execute(conn),
        }
    }
}

#[derive(QueryableByName, Debug)]
struct LatestEventRow {
    #[diesel(sql_type = Nullable<Timestamptz>)]
    latest: Option<DateTime<Utc>>,
}

#[derive(QueryableByName, Debug)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

#[async_trait::async_trait]
impl SeriesRepository for SeriesRepositoryImpl {
    fn ensure_table(&self, data_type: DataType, table: &str) -> Result<(), DatabaseError> {
        validate_identifier(table)?;

        if self.ensured.lock().contains(table) {
            return Ok(());
        }

        let mut conn = (self.get_conn)()?;
        diesel::sql_query(Self::create_table_sql(data_type, table)).execute(&mut conn)?;

        tracing::info!("Target table {} verified for {}", table, data_type);
        self.ensured.lock().insert(table.to_string());

        Ok(())
    }

    fn latest_event_time(
        &self,
        table: &str,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        validate_identifier(table)?;
        let mut conn = (self.get_conn)()?;

        let row = diesel::sql_query(format!(
            "SELECT MAX(event_time) AS latest FROM {} WHERE symbol = $1",
            table
        ))
        .bind::<Text, _>(symbol)
        .get_result::<LatestEventRow>(&mut conn)?;

        Ok(row.latest)
    }

    fn insert_missing(
        &self,
        data_type: DataType,
        table: &str,
        records: &[MarketRecord],
    ) -> Result<WriteOutcome, DatabaseError> {
        validate_identifier(table)?;

        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let conflict = data_type.dedup_columns().join(", ");
        let mut conn = (self.get_conn)()?;

        // One transaction per symbol batch
        conn.transaction::<_, DatabaseError, _>(|conn| {
            let mut outcome = WriteOutcome::default();

            for record in records {
                let inserted = Self::insert_record(conn, table, &conflict, record)?;
                if inserted > 0 {
                    outcome.inserted += 1;
                } else {
                    outcome.skipped_duplicate += 1;
                }
            }

            Ok(outcome)
        })
    }

    fn count_by_symbol(&self, table: &str, symbol: &str) -> Result<i64, DatabaseError> {
        validate_identifier(table)?;
        let mut conn = (self.get_conn)()?;

        let row = diesel::sql_query(format!(
            "SELECT COUNT(*) AS total FROM {} WHERE symbol = $1",
            table
        ))
        .bind::<Text, _>(symbol)
        .get_result::<CountRow>(&mut conn)?;

        Ok(row.total)
    }
}
