//! services/bot/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `DatabaseService`, `CreditLedger` and `SessionStore` ports from the core crate.
//! It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use originality_core::catalog::ServiceKind;
use originality_core::domain::{
    ConversationSession, CreditTransaction, FeedbackRating, NewScoreLog, NewUpload, PaymentStatus,
    ScoreLogEntry, ScoreResult, ScoreStatus, ServiceRecord, TransactionStatus, Upload,
    UploadStatus, UsageNote, User,
};
use originality_core::ports::{
    CreditLedger, DatabaseService, PortError, PortResult, SessionStore,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> PortError {
    let what = what.into();
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => unexpected(other),
    }
}

fn bad_column(column: &str, value: &str) -> PortError {
    PortError::Unexpected(format!("unexpected {} value '{}'", column, value))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, external_id, username, customer_id, credit, analyzing_since";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    external_id: i64,
    username: Option<String>,
    customer_id: Option<String>,
    credit: i64,
    analyzing_since: Option<DateTime<Utc>>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            external_id: self.external_id,
            username: self.username,
            customer_id: self.customer_id,
            credit: self.credit,
            analyzing_since: self.analyzing_since,
        }
    }
}

const UPLOAD_COLUMNS: &str = "id, user_id, service, file_name, file_size, file_path, mime_type, \
     status, payment_status, word_count, credits_required, created_at";

#[derive(FromRow)]
struct UploadRecord {
    id: Uuid,
    user_id: Uuid,
    service: String,
    file_name: String,
    file_size: i64,
    file_path: String,
    mime_type: Option<String>,
    status: String,
    payment_status: String,
    word_count: Option<i64>,
    credits_required: Option<i64>,
    created_at: DateTime<Utc>,
}
impl UploadRecord {
    fn to_domain(self) -> PortResult<Upload> {
        Ok(Upload {
            id: self.id,
            user_id: self.user_id,
            service: ServiceKind::parse(&self.service)
                .ok_or_else(|| bad_column("service", &self.service))?,
            file_name: self.file_name,
            file_size: self.file_size,
            file_path: self.file_path,
            mime_type: self.mime_type,
            status: UploadStatus::parse(&self.status)
                .ok_or_else(|| bad_column("status", &self.status))?,
            payment_status: PaymentStatus::parse(&self.payment_status)
                .ok_or_else(|| bad_column("payment_status", &self.payment_status))?,
            word_count: self.word_count,
            credits_required: self.credits_required,
            created_at: self.created_at,
        })
    }
}

const SCORE_LOG_COLUMNS: &str = "id, user_id, upload_id, word_count, credits_used, request_data, \
     response_data, ai_score, ai_confidence, public_link, scan_id, status, error_message, created_at";

#[derive(FromRow)]
struct ScoreLogRecord {
    id: Uuid,
    user_id: Uuid,
    upload_id: Uuid,
    word_count: i64,
    credits_used: i64,
    request_data: Option<serde_json::Value>,
    response_data: Option<serde_json::Value>,
    ai_score: Option<f64>,
    ai_confidence: Option<f64>,
    public_link: Option<String>,
    scan_id: Option<String>,
    status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}
impl ScoreLogRecord {
    fn to_domain(self) -> PortResult<ScoreLogEntry> {
        Ok(ScoreLogEntry {
            id: self.id,
            user_id: self.user_id,
            upload_id: self.upload_id,
            word_count: self.word_count,
            credits_used: self.credits_used,
            request_data: self.request_data,
            response_data: self.response_data,
            ai_score: self.ai_score,
            ai_confidence: self.ai_confidence,
            public_link: self.public_link,
            scan_id: self.scan_id,
            status: ScoreStatus::parse(&self.status)
                .ok_or_else(|| bad_column("status", &self.status))?,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ServiceRow {
    kind: String,
    name: String,
    available: bool,
    note: Option<String>,
}
impl ServiceRow {
    fn to_domain(self) -> PortResult<ServiceRecord> {
        Ok(ServiceRecord {
            kind: ServiceKind::parse(&self.kind).ok_or_else(|| bad_column("kind", &self.kind))?,
            name: self.name,
            available: self.available,
            note: self.note,
        })
    }
}

const TRANSACTION_COLUMNS: &str = "id, user_id, checkout_session_id, amount, currency, credits, status";

#[derive(FromRow)]
struct TransactionRecord {
    id: Uuid,
    user_id: Uuid,
    checkout_session_id: Option<String>,
    amount: i64,
    currency: String,
    credits: i64,
    status: String,
}
impl TransactionRecord {
    fn to_domain(self) -> PortResult<CreditTransaction> {
        Ok(CreditTransaction {
            id: self.id,
            user_id: self.user_id,
            checkout_session_id: self.checkout_session_id,
            amount: self.amount,
            currency: self.currency,
            credits: self.credits,
            status: TransactionStatus::parse(&self.status)
                .ok_or_else(|| bad_column("status", &self.status))?,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_or_create_user(
        &self,
        external_id: i64,
        username: Option<&str>,
    ) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, external_id, username) VALUES ($1, $2, $3) \
             ON CONFLICT (external_id) DO UPDATE \
             SET username = COALESCE(EXCLUDED.username, users.username), updated_at = NOW() \
             RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(external_id)
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
        sqlx::query("UPDATE users SET customer_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(customer_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn try_acquire_busy_lease(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        max_hold: chrono::Duration,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET analyzing_since = $2 \
             WHERE id = $1 AND (analyzing_since IS NULL OR analyzing_since < $3)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now - max_hold)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_busy_lease(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE users SET analyzing_since = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_upload(&self, upload: NewUpload) -> PortResult<Upload> {
        let sql = format!(
            "INSERT INTO uploads (id, user_id, service, file_name, file_size, file_path, mime_type, \
             status, payment_status, word_count, credits_required) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', $8, $9, $10) RETURNING {}",
            UPLOAD_COLUMNS
        );
        let record = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(upload.user_id)
            .bind(upload.service.as_str())
            .bind(&upload.file_name)
            .bind(upload.file_size)
            .bind(&upload.file_path)
            .bind(&upload.mime_type)
            .bind(upload.payment_status.as_str())
            .bind(upload.word_count)
            .bind(upload.credits_required)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload> {
        let sql = format!("SELECT {} FROM uploads WHERE id = $1", UPLOAD_COLUMNS);
        let record = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(upload_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Upload {} not found", upload_id)))?;
        record.to_domain()
    }

    async fn complete_upload(&self, upload_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE uploads SET status = 'completed', payment_status = 'paid', updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(upload_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn set_upload_payment_status(
        &self,
        upload_id: Uuid,
        payment_status: PaymentStatus,
    ) -> PortResult<()> {
        sqlx::query("UPDATE uploads SET payment_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(payment_status.as_str())
            .bind(upload_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_score_log(&self, entry: NewScoreLog) -> PortResult<ScoreLogEntry> {
        let sql = format!(
            "INSERT INTO score_logs (id, user_id, upload_id, word_count, credits_used, request_data, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') RETURNING {}",
            SCORE_LOG_COLUMNS
        );
        let record = sqlx::query_as::<_, ScoreLogRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.user_id)
            .bind(entry.upload_id)
            .bind(entry.word_count)
            .bind(entry.credits_used)
            .bind(&entry.request_data)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn complete_score_log(&self, log_id: Uuid, result: &ScoreResult) -> PortResult<()> {
        sqlx::query(
            "UPDATE score_logs SET status = 'completed', response_data = $2, ai_score = $3, \
             ai_confidence = $4, public_link = $5, scan_id = $6, updated_at = NOW() WHERE id = $1",
        )
        .bind(log_id)
        .bind(&result.raw_response)
        .bind(result.ai_score)
        .bind(result.ai_confidence)
        .bind(&result.public_link)
        .bind(&result.scan_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn fail_score_log(&self, log_id: Uuid, error_message: &str) -> PortResult<()> {
        sqlx::query(
            "UPDATE score_logs SET status = 'failed', error_message = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(log_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn latest_score_log(&self, upload_id: Uuid) -> PortResult<Option<ScoreLogEntry>> {
        let sql = format!(
            "SELECT {} FROM score_logs WHERE upload_id = $1 ORDER BY created_at DESC LIMIT 1",
            SCORE_LOG_COLUMNS
        );
        sqlx::query_as::<_, ScoreLogRecord>(&sql)
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ScoreLogRecord::to_domain)
            .transpose()
    }

    async fn list_services(&self) -> PortResult<Vec<ServiceRecord>> {
        let records = sqlx::query_as::<_, ServiceRow>(
            "SELECT kind, name, available, note FROM services ORDER BY kind ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(ServiceRow::to_domain).collect()
    }

    async fn get_service(&self, kind: ServiceKind) -> PortResult<Option<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRow>(
            "SELECT kind, name, available, note FROM services WHERE kind = $1",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(ServiceRow::to_domain)
        .transpose()
    }

    async fn set_service_availability(
        &self,
        kind: ServiceKind,
        available: bool,
        note: &str,
    ) -> PortResult<Option<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRow>(
            "UPDATE services SET available = $2, note = $3, updated_at = NOW() WHERE kind = $1 \
             RETURNING kind, name, available, note",
        )
        .bind(kind.as_str())
        .bind(available)
        .bind(note)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(ServiceRow::to_domain)
        .transpose()
    }

    async fn create_transaction(
        &self,
        user_id: Uuid,
        amount: i64,
        currency: &str,
        credits: i64,
    ) -> PortResult<CreditTransaction> {
        let sql = format!(
            "INSERT INTO transactions (id, user_id, amount, currency, credits, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') RETURNING {}",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(amount)
            .bind(currency)
            .bind(credits)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn attach_checkout_session(
        &self,
        transaction_id: Uuid,
        session_id: &str,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE transactions SET checkout_session_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(session_id)
        .bind(transaction_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn pending_transactions(&self, user_id: Uuid) -> PortResult<Vec<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1 AND status = 'pending' \
             ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        );
        let records = sqlx::query_as::<_, TransactionRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(TransactionRecord::to_domain).collect()
    }

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> PortResult<Option<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE checkout_session_id = $1",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(TransactionRecord::to_domain)
            .transpose()
    }

    async fn save_feedback(
        &self,
        user_id: Uuid,
        rating: FeedbackRating,
        message: Option<&str>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO feedback (id, user_id, rating, message) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(rating.as_str())
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `CreditLedger` Trait Implementation
//=========================================================================================

async fn append_usage(
    tx: &mut Transaction<'static, Postgres>,
    user_id: Uuid,
    credits_used: i64,
    note: &UsageNote,
) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO credit_usage (id, user_id, upload_id, credits_used, description) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(note.upload_id)
    .bind(credits_used)
    .bind(&note.description)
    .execute(&mut **tx)
    .await
    .map_err(unexpected)?;
    Ok(())
}

#[async_trait]
impl CreditLedger for DbAdapter {
    async fn balance(&self, user_id: Uuid) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT credit FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User {} not found", user_id)))
    }

    async fn debit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64> {
        let mut tx = self.begin().await?;

        // Conditional update: concurrent debits can never drive the balance negative.
        let balance = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET credit = credit - $1, updated_at = NOW() \
             WHERE id = $2 AND credit >= $1 RETURNING credit",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let Some(balance) = balance else {
            let available = sqlx::query_scalar::<_, i64>("SELECT credit FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
            tx.rollback().await.map_err(unexpected)?;
            return match available {
                Some(available) => Err(PortError::InsufficientCredit {
                    required: amount,
                    available,
                }),
                None => Err(PortError::NotFound(format!("User {} not found", user_id))),
            };
        };

        append_usage(&mut tx, user_id, amount, &note).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(balance)
    }

    async fn credit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64> {
        let mut tx = self.begin().await?;
        let balance = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET credit = credit + $1, updated_at = NOW() WHERE id = $2 RETURNING credit",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(not_found(format!("User {} not found", user_id)))?;

        append_usage(&mut tx, user_id, -amount, &note).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(balance)
    }

    async fn settle_purchase(&self, transaction_id: Uuid) -> PortResult<Option<i64>> {
        let mut tx = self.begin().await?;

        let claimed = sqlx::query_as::<_, (Uuid, i64)>(
            "UPDATE transactions SET status = 'completed', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING user_id, credits",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let Some((user_id, credits)) = claimed else {
            tx.rollback().await.map_err(unexpected)?;
            return Ok(None);
        };

        let balance = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET credit = credit + $1, updated_at = NOW() WHERE id = $2 RETURNING credit",
        )
        .bind(credits)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        let note = UsageNote {
            upload_id: None,
            description: format!("Credit purchase: {} credits", credits),
        };
        append_usage(&mut tx, user_id, -credits, &note).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(Some(balance))
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn load(&self, conversation_id: &str) -> PortResult<ConversationSession> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM conversation_sessions WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        let Some(data) = data else {
            return Ok(ConversationSession::default());
        };
        // The session is only a cache; an unreadable one starts over.
        Ok(serde_json::from_value(data).unwrap_or_else(|e| {
            warn!(%conversation_id, error = %e, "Discarding unreadable session");
            ConversationSession::default()
        }))
    }

    async fn save(&self, conversation_id: &str, session: &ConversationSession) -> PortResult<()> {
        let data = serde_json::to_value(session)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode session: {}", e)))?;
        sqlx::query(
            "INSERT INTO conversation_sessions (conversation_id, data) VALUES ($1, $2) \
             ON CONFLICT (conversation_id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(conversation_id)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
