use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rale_core::{
    ActivitySignal, Level, LevelRecord, NeighborhoodKey, ProposerId, VisitRecord, Window,
};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info_span, warn, Instrument};

use crate::{
    LevelRepository, LikeRepository, PaymentRepository, ProposalRepository, ProposerDirectory,
    StorageError, VisitRepository, PAYMENT_STATUS_DONE,
};

/// Backend over the platform's shared Postgres schema.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    like_timestamps: bool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self, StorageError> {
        let like_timestamps: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                  FROM information_schema.columns
                 WHERE table_name = 'proposals_proposerlikeproposal'
                   AND column_name = 'created_at'
            )
            "#,
        )
        .fetch_one(&pool)
        .await?;
        if !like_timestamps {
            warn!("like rows have no created_at column; likes will not be counted");
        }
        Ok(Self {
            pool,
            like_timestamps,
        })
    }

    async fn fetch_addresses(
        &self,
        sql: &'static str,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        let rows = sqlx::query(sql)
            .bind(proposer)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| address_column(row).map(ActivitySignal::new))
            .collect()
    }
}

fn address_column(row: &PgRow) -> Result<JsonValue, StorageError> {
    let address: Option<JsonValue> = row.try_get("address")?;
    Ok(address.unwrap_or(JsonValue::Null))
}

#[async_trait]
impl ProposerDirectory for PgStore {
    async fn proposer_ids(
        &self,
        only: Option<&[ProposerId]>,
    ) -> Result<Vec<ProposerId>, StorageError> {
        let ids = match only {
            Some(ids) => {
                sqlx::query_scalar(
                    r#"
                    SELECT id FROM accounts_proposer
                     WHERE id = ANY($1)
                     ORDER BY id
                    "#,
                )
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT id FROM accounts_proposer ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(ids)
    }
}

#[async_trait]
impl VisitRepository for PgStore {
    async fn visits_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<VisitRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT created_at, address
              FROM accounts_locationhistory
             WHERE user_id = $1
               AND created_at >= $2
               AND created_at < $3
             ORDER BY created_at
            "#,
        )
        .bind(proposer)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let at: DateTime<Utc> = row.try_get("created_at")?;
            out.push(VisitRecord {
                at,
                address: address_column(&row)?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl ProposalRepository for PgStore {
    async fn authored_proposals_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        self.fetch_addresses(
            r#"
            SELECT address
              FROM proposals_proposal
             WHERE user_id = $1
               AND created_at >= $2
               AND created_at < $3
            "#,
            proposer,
            window,
        )
        .await
    }
}

#[async_trait]
impl LikeRepository for PgStore {
    fn supports_window_filter(&self) -> bool {
        self.like_timestamps
    }

    async fn likes_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        if !self.like_timestamps {
            return Ok(Vec::new());
        }
        self.fetch_addresses(
            r#"
            SELECT p.address
              FROM proposals_proposerlikeproposal l
              LEFT JOIN proposals_proposal p ON p.id = l.proposal_id
             WHERE l.user_id = $1
               AND l.created_at >= $2
               AND l.created_at < $3
            "#,
            proposer,
            window,
        )
        .await
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn completed_payments_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT p.address
              FROM pays_payment pay
              LEFT JOIN fundings_funding f ON f.id = pay.funding_id
              LEFT JOIN proposals_proposal p ON p.id = f.proposal_id
             WHERE pay.user_id = $1
               AND pay.status = $4
               AND pay.approved_at >= $2
               AND pay.approved_at < $3
            "#,
        )
        .bind(proposer)
        .bind(window.start)
        .bind(window.end)
        .bind(PAYMENT_STATUS_DONE)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| address_column(row).map(ActivitySignal::new))
            .collect()
    }
}

#[async_trait]
impl LevelRepository for PgStore {
    async fn find_latest(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
    ) -> Result<Option<LevelRecord>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, level
              FROM accounts_proposerlevel
             WHERE user_id = $1
               AND address->>'sido' = $2
               AND address->>'sigungu' = $3
               AND address->>'eupmyundong' = $4
             ORDER BY id DESC
             LIMIT 1
            "#,
        )
        .bind(proposer)
        .bind(neighborhood.region())
        .bind(neighborhood.district())
        .bind(neighborhood.subdistrict())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id")?;
        let raw: i16 = row.try_get("level")?;
        let level =
            Level::try_from(raw).map_err(|source| StorageError::InvalidLevel { id, source })?;
        Ok(Some(LevelRecord {
            id,
            proposer_id: proposer.to_string(),
            neighborhood: neighborhood.clone(),
            level,
        }))
    }

    async fn create(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
        level: Level,
    ) -> Result<LevelRecord, StorageError> {
        let span = info_span!("level_insert", proposer, %neighborhood);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts_proposerlevel (user_id, address, level)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(proposer)
        .bind(neighborhood.to_address())
        .bind(i16::from(level.as_u8()))
        .fetch_one(&self.pool)
        .instrument(span)
        .await?;
        Ok(LevelRecord {
            id,
            proposer_id: proposer.to_string(),
            neighborhood: neighborhood.clone(),
            level,
        })
    }

    async fn update_level(&self, id: i64, level: Level) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE accounts_proposerlevel SET level = $1 WHERE id = $2")
            .bind(i16::from(level.as_u8()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::MissingLevel(id));
        }
        Ok(())
    }
}
