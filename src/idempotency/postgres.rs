use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, sea_query::OnConflict,
};
use serde_json::Value;

use super::{BeginOutcome, IdempotencyStore, STATE_COMPLETED, STATE_IN_FLIGHT};
use crate::{
    db::OrmConn,
    entity::idempotency_keys::{ActiveModel, Column, Entity as IdempotencyKeys},
    error::AppResult,
};

/// Store backed by the `idempotency_keys` table; shared by every replica.
#[derive(Clone)]
pub struct PgIdempotencyStore {
    conn: OrmConn,
}

impl PgIdempotencyStore {
    pub fn new(conn: OrmConn) -> Self {
        Self { conn }
    }

    fn expiry(ttl: Duration) -> chrono::DateTime<Utc> {
        Utc::now() + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::days(1))
    }

    fn model(
        scope: &str,
        key: &str,
        fingerprint: &str,
        response: Option<Value>,
        ttl: Duration,
    ) -> ActiveModel {
        let now = Utc::now();
        ActiveModel {
            scope: Set(scope.to_string()),
            key: Set(key.to_string()),
            fingerprint: Set(fingerprint.to_string()),
            state: Set(if response.is_some() {
                STATE_COMPLETED.to_string()
            } else {
                STATE_IN_FLIGHT.to_string()
            }),
            response: Set(response),
            created_at: Set(now.into()),
            expires_at: Set(Self::expiry(ttl).into()),
        }
    }

    async fn purge_expired(&self, scope: &str, key: &str) -> AppResult<()> {
        IdempotencyKeys::delete_many()
            .filter(Column::Scope.eq(scope))
            .filter(Column::Key.eq(key))
            .filter(Column::ExpiresAt.lte(Utc::now()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn begin(
        &self,
        scope: &str,
        key: &str,
        fingerprint: &str,
        lease: Duration,
    ) -> AppResult<BeginOutcome> {
        self.purge_expired(scope, key).await?;

        let inserted = IdempotencyKeys::insert(Self::model(scope, key, fingerprint, None, lease))
            .on_conflict(
                OnConflict::columns([Column::Scope, Column::Key])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        if inserted == 1 {
            return Ok(BeginOutcome::Started);
        }

        let existing = IdempotencyKeys::find_by_id((scope.to_string(), key.to_string()))
            .one(&self.conn)
            .await?;
        Ok(match existing {
            // Released between our insert and read; the caller retries.
            None => BeginOutcome::InFlight,
            Some(record) if record.fingerprint != fingerprint => BeginOutcome::Mismatch,
            Some(record) => match record.response {
                Some(response) if record.state == STATE_COMPLETED => {
                    BeginOutcome::Completed(response)
                }
                _ => BeginOutcome::InFlight,
            },
        })
    }

    async fn complete(
        &self,
        scope: &str,
        key: &str,
        response: &Value,
        ttl: Duration,
    ) -> AppResult<()> {
        IdempotencyKeys::update_many()
            .set(ActiveModel {
                state: Set(STATE_COMPLETED.to_string()),
                response: Set(Some(response.clone())),
                expires_at: Set(Self::expiry(ttl).into()),
                ..Default::default()
            })
            .filter(Column::Scope.eq(scope))
            .filter(Column::Key.eq(key))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> AppResult<()> {
        IdempotencyKeys::delete_many()
            .filter(Column::Scope.eq(scope))
            .filter(Column::Key.eq(key))
            .filter(Column::State.eq(STATE_IN_FLIGHT))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn lookup(&self, scope: &str, key: &str) -> AppResult<Option<Value>> {
        let record = IdempotencyKeys::find_by_id((scope.to_string(), key.to_string()))
            .filter(Column::ExpiresAt.gt(Utc::now()))
            .filter(Column::State.eq(STATE_COMPLETED))
            .one(&self.conn)
            .await?;
        Ok(record.and_then(|record| record.response))
    }

    async fn record(
        &self,
        scope: &str,
        key: &str,
        response: &Value,
        ttl: Duration,
    ) -> AppResult<()> {
        IdempotencyKeys::insert(Self::model(scope, key, "", Some(response.clone()), ttl))
            .on_conflict(
                OnConflict::columns([Column::Scope, Column::Key])
                    .update_columns([
                        Column::Fingerprint,
                        Column::State,
                        Column::Response,
                        Column::CreatedAt,
                        Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        Ok(())
    }
}
