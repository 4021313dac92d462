//! SQLite storage implementation
//!
//! This module provides a SQLite-based storage backend that implements the
//! `WalletStorage` trait. JSON columns hold the nested draft configuration
//! and proof material.

#[cfg(feature = "storage")]
use async_trait::async_trait;
#[cfg(feature = "storage")]
use rusqlite::{params, Row};
#[cfg(feature = "storage")]
use std::path::Path;
#[cfg(feature = "storage")]
use tokio_rusqlite::Connection;

#[cfg(feature = "storage")]
use crate::{
    data_structures::{
        draft_transaction::{DraftStatus, DraftTransaction},
        recorded_transaction::RecordedTransaction,
        script::ScriptType,
        utxo::Utxo,
    },
    errors::{WalletError, WalletResult},
    storage::{DraftQuery, UtxoQuery, UtxoStatus, WalletStorage},
};

/// SQLite storage backend
#[cfg(feature = "storage")]
pub struct SqliteWalletStorage {
    connection: Connection,
}

#[cfg(feature = "storage")]
struct TransactionRow {
    id: String,
    hex: String,
    block_height: i64,
    block_hash: Option<String>,
    merkle_proof_json: Option<String>,
    bump_json: Option<String>,
    draft_id: Option<String>,
}

#[cfg(feature = "storage")]
struct DraftRow {
    id: String,
    owner_id: String,
    created_at: i64,
    expires_at: i64,
    status: i64,
    configuration_json: String,
    hex: String,
    bumps_json: String,
    final_tx_id: Option<String>,
}

#[cfg(feature = "storage")]
impl SqliteWalletStorage {
    /// Open (or create) a database file and make sure the schema exists
    pub async fn new<P: AsRef<Path>>(database_path: P) -> WalletResult<Self> {
        let connection = Connection::open(database_path).await.map_err(|e| {
            WalletError::StorageError(format!("Failed to open SQLite database: {e}"))
        })?;
        let storage = Self { connection };
        storage.initialize().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage instance (useful for testing)
    pub async fn new_in_memory() -> WalletResult<Self> {
        let connection = Connection::open(":memory:").await.map_err(|e| {
            WalletError::StorageError(format!("Failed to create in-memory database: {e}"))
        })?;
        let storage = Self { connection };
        storage.initialize().await?;
        Ok(storage)
    }

    /// Create the database schema
    async fn create_schema(&self) -> WalletResult<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS utxos (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                transaction_id TEXT NOT NULL,
                output_index INTEGER NOT NULL,
                script_pub_key TEXT NOT NULL,
                satoshis INTEGER NOT NULL,
                script_type TEXT NOT NULL,
                draft_id TEXT,
                reserved_at INTEGER,
                spending_tx_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(transaction_id, output_index)
            );

            CREATE INDEX IF NOT EXISTS idx_utxos_owner ON utxos(owner_id);
            CREATE INDEX IF NOT EXISTS idx_utxos_draft ON utxos(draft_id);

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                hex TEXT NOT NULL,
                block_height INTEGER NOT NULL DEFAULT 0,
                block_hash TEXT,
                merkle_proof_json TEXT,
                bump_json TEXT,
                draft_id TEXT
            );

            CREATE TABLE IF NOT EXISTS draft_transactions (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                status INTEGER NOT NULL,
                configuration_json TEXT NOT NULL,
                hex TEXT NOT NULL,
                bumps_json TEXT NOT NULL,
                final_tx_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_drafts_status_expiry
                ON draft_transactions(status, expires_at);
        "#;

        self.connection
            .call(move |conn| Ok(conn.execute_batch(sql)?))
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to create schema: {e}")))
    }

    fn row_to_utxo(row: &Row) -> rusqlite::Result<Utxo> {
        let script_pub_key: String = row.get("script_pub_key")?;
        let script_type: String = row.get("script_type")?;
        Ok(Utxo {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            transaction_id: row.get("transaction_id")?,
            output_index: row.get::<_, i64>("output_index")? as u32,
            satoshis: row.get::<_, i64>("satoshis")? as u64,
            script_type: script_type
                .parse()
                .unwrap_or_else(|_| ScriptType::detect_hex(&script_pub_key)),
            script_pub_key,
            draft_id: row.get("draft_id")?,
            reserved_at: row.get::<_, Option<i64>>("reserved_at")?.map(|t| t as u64),
            spending_tx_id: row.get("spending_tx_id")?,
        })
    }

    /// Build the WHERE clause for a UTXO query
    fn build_utxo_query_clause(query: &UtxoQuery) -> (String, Vec<Box<dyn rusqlite::ToSql + Send>>) {
        let mut conditions = vec!["owner_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql + Send>> = vec![Box::new(query.owner_id.clone())];

        match query.status {
            Some(UtxoStatus::Unspent) => {
                conditions.push("draft_id IS NULL AND spending_tx_id IS NULL".to_string())
            }
            Some(UtxoStatus::Reserved) => {
                conditions.push("draft_id IS NOT NULL AND spending_tx_id IS NULL".to_string())
            }
            Some(UtxoStatus::Spent) => conditions.push("spending_tx_id IS NOT NULL".to_string()),
            None => {}
        }

        if let Some(script_type) = query.script_type {
            conditions.push("script_type = ?".to_string());
            params.push(Box::new(script_type.as_str().to_string()));
        }

        if let Some(draft_id) = &query.draft_id {
            conditions.push("draft_id = ?".to_string());
            params.push(Box::new(draft_id.clone()));
        }

        if let Some(pointers) = &query.pointers {
            let clauses: Vec<&str> = pointers
                .iter()
                .map(|_| "(transaction_id = ? AND output_index = ?)")
                .collect();
            conditions.push(format!("({})", clauses.join(" OR ")));
            for pointer in pointers {
                params.push(Box::new(pointer.transaction_id.clone()));
                params.push(Box::new(pointer.output_index as i64));
            }
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_transaction(row: &Row) -> rusqlite::Result<TransactionRow> {
        Ok(TransactionRow {
            id: row.get("id")?,
            hex: row.get("hex")?,
            block_height: row.get("block_height")?,
            block_hash: row.get("block_hash")?,
            merkle_proof_json: row.get("merkle_proof_json")?,
            bump_json: row.get("bump_json")?,
            draft_id: row.get("draft_id")?,
        })
    }

    fn transaction_from_row(row: TransactionRow) -> WalletResult<RecordedTransaction> {
        Ok(RecordedTransaction {
            id: row.id,
            hex: row.hex,
            block_height: row.block_height as u64,
            block_hash: row.block_hash,
            merkle_proof: row
                .merkle_proof_json
                .map(|j| serde_json::from_str(&j))
                .transpose()?,
            bump: row.bump_json.map(|j| serde_json::from_str(&j)).transpose()?,
            draft_id: row.draft_id,
        })
    }

    fn row_to_draft(row: &Row) -> rusqlite::Result<DraftRow> {
        Ok(DraftRow {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            created_at: row.get("created_at")?,
            expires_at: row.get("expires_at")?,
            status: row.get("status")?,
            configuration_json: row.get("configuration_json")?,
            hex: row.get("hex")?,
            bumps_json: row.get("bumps_json")?,
            final_tx_id: row.get("final_tx_id")?,
        })
    }

    fn draft_from_row(row: DraftRow) -> WalletResult<DraftTransaction> {
        Ok(DraftTransaction {
            id: row.id,
            owner_id: row.owner_id,
            created_at: row.created_at as u64,
            expires_at: row.expires_at as u64,
            status: DraftStatus::from(row.status as u32),
            configuration: serde_json::from_str(&row.configuration_json)?,
            hex: row.hex,
            bumps: serde_json::from_str(&row.bumps_json)?,
            final_tx_id: row.final_tx_id,
        })
    }
}

#[cfg(feature = "storage")]
#[async_trait]
impl WalletStorage for SqliteWalletStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.create_schema().await
    }

    async fn get_utxos(&self, query: &UtxoQuery) -> WalletResult<Vec<Utxo>> {
        let query = query.clone();
        self.connection
            .call(move |conn| {
                let (where_clause, params_values) = Self::build_utxo_query_clause(&query);
                let mut sql = format!(
                    "SELECT * FROM utxos {where_clause} ORDER BY satoshis ASC, transaction_id ASC, output_index ASC"
                );
                if let Some(limit) = query.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }

                let mut stmt = conn.prepare(&sql)?;
                let param_refs: Vec<&dyn rusqlite::ToSql> = params_values
                    .iter()
                    .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
                    .collect();
                let rows = stmt.query_map(&param_refs[..], Self::row_to_utxo)?;

                let mut utxos = Vec::new();
                for row in rows {
                    utxos.push(row?);
                }
                Ok(utxos)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get utxos: {e}")))
    }

    async fn get_utxo(&self, id: &str) -> WalletResult<Option<Utxo>> {
        let id = id.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM utxos WHERE id = ?")?;
                let mut rows = stmt.query_map(params![id], Self::row_to_utxo)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get utxo: {e}")))
    }

    async fn save_utxo(&self, utxo: &Utxo) -> WalletResult<()> {
        let utxo = utxo.clone();
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO utxos
                    (id, owner_id, transaction_id, output_index, script_pub_key, satoshis,
                    script_type, draft_id, reserved_at, spending_tx_id)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        owner_id = excluded.owner_id,
                        script_pub_key = excluded.script_pub_key,
                        satoshis = excluded.satoshis,
                        script_type = excluded.script_type,
                        draft_id = excluded.draft_id,
                        reserved_at = excluded.reserved_at,
                        spending_tx_id = excluded.spending_tx_id
                    "#,
                    params![
                        utxo.id,
                        utxo.owner_id,
                        utxo.transaction_id,
                        utxo.output_index as i64,
                        utxo.script_pub_key,
                        utxo.satoshis as i64,
                        utxo.script_type.as_str(),
                        utxo.draft_id,
                        utxo.reserved_at.map(|t| t as i64),
                        utxo.spending_tx_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save utxo: {e}")))
    }

    async fn get_transaction_by_id(&self, txid: &str) -> WalletResult<Option<RecordedTransaction>> {
        let txid = txid.to_string();
        let row = self
            .connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM transactions WHERE id = ?")?;
                let mut rows = stmt.query_map(params![txid], Self::row_to_transaction)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get transaction: {e}")))?;
        row.map(Self::transaction_from_row).transpose()
    }

    async fn save_transaction(&self, tx: &RecordedTransaction) -> WalletResult<()> {
        let merkle_proof_json = tx.merkle_proof.as_ref().map(serde_json::to_string).transpose()?;
        let bump_json = tx.bump.as_ref().map(serde_json::to_string).transpose()?;
        let tx = tx.clone();
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO transactions
                    (id, hex, block_height, block_hash, merkle_proof_json, bump_json, draft_id)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        tx.id,
                        tx.hex,
                        tx.block_height as i64,
                        tx.block_hash,
                        merkle_proof_json,
                        bump_json,
                        tx.draft_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save transaction: {e}")))
    }

    async fn get_draft(&self, id: &str) -> WalletResult<Option<DraftTransaction>> {
        let id = id.to_string();
        let row = self
            .connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM draft_transactions WHERE id = ?")?;
                let mut rows = stmt.query_map(params![id], Self::row_to_draft)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get draft: {e}")))?;
        row.map(Self::draft_from_row).transpose()
    }

    async fn save_draft(&self, draft: &DraftTransaction) -> WalletResult<()> {
        let configuration_json = serde_json::to_string(&draft.configuration)?;
        let bumps_json = serde_json::to_string(&draft.bumps)?;
        let draft = draft.clone();
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO draft_transactions
                    (id, owner_id, created_at, expires_at, status, configuration_json, hex,
                    bumps_json, final_tx_id)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        draft.id,
                        draft.owner_id,
                        draft.created_at as i64,
                        draft.expires_at as i64,
                        u32::from(draft.status) as i64,
                        configuration_json,
                        draft.hex,
                        bumps_json,
                        draft.final_tx_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save draft: {e}")))
    }

    async fn get_drafts(&self, query: &DraftQuery) -> WalletResult<Vec<DraftTransaction>> {
        let query = query.clone();
        let rows = self
            .connection
            .call(move |conn| {
                let mut conditions: Vec<&str> = Vec::new();
                let mut params_values: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();
                if let Some(owner_id) = &query.owner_id {
                    conditions.push("owner_id = ?");
                    params_values.push(Box::new(owner_id.clone()));
                }
                if let Some(status) = query.status {
                    conditions.push("status = ?");
                    params_values.push(Box::new(u32::from(status) as i64));
                }
                if let Some(expires_before) = query.expires_before {
                    conditions.push("expires_at <= ?");
                    params_values.push(Box::new(expires_before as i64));
                }

                let mut sql = "SELECT * FROM draft_transactions".to_string();
                if !conditions.is_empty() {
                    sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
                }
                sql.push_str(" ORDER BY created_at ASC, id ASC");
                if let Some(limit) = query.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }

                let mut stmt = conn.prepare(&sql)?;
                let param_refs: Vec<&dyn rusqlite::ToSql> = params_values
                    .iter()
                    .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
                    .collect();
                let rows = stmt.query_map(&param_refs[..], Self::row_to_draft)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get drafts: {e}")))?;
        rows.into_iter().map(Self::draft_from_row).collect()
    }
}
