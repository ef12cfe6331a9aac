//! Order record persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use types::{OrderRecord, Side, TradeType};

use crate::error::{Result, StrategyError};

/// Storage for executed orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist `record`, returning its row id
    async fn save(&self, record: &OrderRecord) -> Result<i64>;

    /// Newest order of `strategy` on `symbol`/`side`/`trade_type` created at
    /// or after `since`
    async fn recent_order(
        &self,
        strategy: &str,
        symbol: &str,
        side: Side,
        trade_type: TradeType,
        since: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>>;
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    records: Mutex<Vec<OrderRecord>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OrderRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, record: &OrderRecord) -> Result<i64> {
        let mut records = self.records.lock();
        let id = records.len() as i64 + 1;
        records.push(OrderRecord {
            id: Some(id),
            ..record.clone()
        });
        Ok(id)
    }

    async fn recent_order(
        &self,
        strategy: &str,
        symbol: &str,
        side: Side,
        trade_type: TradeType,
        since: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| {
                r.strategy == strategy
                    && r.symbol == symbol
                    && r.side == side
                    && r.trade_type == trade_type
                    && r.created_at >= since
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS order_records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id    TEXT NOT NULL,
    symbol      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    side        TEXT NOT NULL,
    price       TEXT NOT NULL,
    quantity    TEXT NOT NULL,
    order_type  TEXT NOT NULL,
    tp          TEXT,
    sl          TEXT,
    strategy    TEXT NOT NULL,
    comment     TEXT NOT NULL DEFAULT '',
    trade_type  TEXT NOT NULL,
    mgn_mode    TEXT NOT NULL,
    leverage    INTEGER NOT NULL,
    timestamp   TEXT NOT NULL,
    level       INTEGER NOT NULL,
    score       REAL NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_order_records_recent
    ON order_records (strategy, symbol, side, trade_type, created_at);
";

const SELECT_COLUMNS: &str = "id, order_id, symbol, created_at, side, price, quantity, order_type, \
    tp, sl, strategy, comment, trade_type, mgn_mode, leverage, timestamp, level, score";

/// SQLite-backed store; calls run on the blocking pool
#[derive(Clone)]
pub struct SqliteOrderStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOrderStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| StrategyError::Task {
                message: e.to_string(),
            })?
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRecord> {
    Ok(OrderRecord {
        id: row.get(0)?,
        order_id: row.get(1)?,
        symbol: row.get(2)?,
        created_at: row.get(3)?,
        side: parse_column(row, 4)?,
        price: parse_column(row, 5)?,
        quantity: parse_column(row, 6)?,
        order_type: parse_column(row, 7)?,
        tp: parse_optional_decimal(row, 8)?,
        sl: parse_optional_decimal(row, 9)?,
        strategy: row.get(10)?,
        comment: row.get(11)?,
        trade_type: parse_column(row, 12)?,
        mgn_mode: parse_column(row, 13)?,
        leverage: row.get(14)?,
        timestamp: row.get(15)?,
        level: row.get(16)?,
        score: row.get(17)?,
    })
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn save(&self, record: &OrderRecord) -> Result<i64> {
        let r = record.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO order_records (order_id, symbol, created_at, side, price, quantity, \
                 order_type, tp, sl, strategy, comment, trade_type, mgn_mode, leverage, timestamp, \
                 level, score) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                 ?14, ?15, ?16, ?17)",
                params![
                    r.order_id,
                    r.symbol,
                    r.created_at,
                    r.side.as_str(),
                    r.price.to_string(),
                    r.quantity.to_string(),
                    r.order_type.as_str(),
                    r.tp.map(|d| d.to_string()),
                    r.sl.map(|d| d.to_string()),
                    r.strategy,
                    r.comment,
                    r.trade_type.as_str(),
                    r.mgn_mode.as_str(),
                    r.leverage,
                    r.timestamp,
                    r.level,
                    r.score,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn recent_order(
        &self,
        strategy: &str,
        symbol: &str,
        side: Side,
        trade_type: TradeType,
        since: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        let (strategy, symbol) = (strategy.to_string(), symbol.to_string());
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM order_records \
                 WHERE strategy = ?1 AND symbol = ?2 AND side = ?3 AND trade_type = ?4 \
                 AND created_at >= ?5 ORDER BY created_at DESC LIMIT 1"
            );
            let record = conn
                .query_row(
                    &sql,
                    params![strategy, symbol, side.as_str(), trade_type.as_str(), since],
                    record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }
}
