use super::{PreferenceStore, PreferenceUpdateFn};
use crate::error::Result;
use crate::models::{is_valid_category_slug, UserPreference};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// `user_preferences` rows: one per user, JSONB score maps
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type PreferenceRow = (Value, Value, Option<DateTime<Utc>>);

fn row_to_preference(user_id: Uuid, row: PreferenceRow) -> UserPreference {
    let (categories, keywords, updated_at) = row;
    UserPreference {
        user_id,
        fav_categories: parse_score_map(&categories, true),
        fav_keywords: parse_score_map(&keywords, false),
        updated_at,
    }
}

/// Tolerant score-map loader. Non-numeric, negative and non-finite scores are
/// dropped; with `slugs_only`, keys that are not valid category slugs too.
pub fn parse_score_map(value: &Value, slugs_only: bool) -> HashMap<String, f64> {
    let Some(object) = value.as_object() else {
        if !value.is_null() {
            warn!("Ignoring non-object preference score map");
        }
        return HashMap::new();
    };

    object
        .iter()
        .filter_map(|(key, raw)| {
            let key = key.trim();
            if key.is_empty() || (slugs_only && !is_valid_category_slug(key)) {
                return None;
            }
            let score = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            (score.is_finite() && score >= 0.0).then(|| (key.to_string(), score))
        })
        .collect()
}

fn score_map_to_json(map: &HashMap<String, f64>) -> Value {
    Value::Object(
        map.iter()
            .filter_map(|(k, v)| serde_json::Number::from_f64(*v).map(|n| (k.clone(), Value::Number(n))))
            .collect(),
    )
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserPreference>> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT fav_categories, fav_keywords, updated_at
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_preference(user_id, row)))
    }

    async fn update_with(
        &self,
        user_id: Uuid,
        update: &PreferenceUpdateFn,
    ) -> Result<UserPreference> {
        let mut tx = self.pool.begin().await?;

        // Make sure a row exists so FOR UPDATE has something to lock.
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, fav_categories, fav_keywords, updated_at)
            VALUES ($1, '{}'::jsonb, '{}'::jsonb, NULL)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT fav_categories, fav_keywords, updated_at
            FROM user_preferences
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let current = row_to_preference(user_id, row);
        let is_blank = current.updated_at.is_none()
            && current.fav_categories.is_empty()
            && current.fav_keywords.is_empty();
        let next = update(if is_blank { None } else { Some(current) });

        sqlx::query(
            r#"
            UPDATE user_preferences
            SET fav_categories = $2, fav_keywords = $3, updated_at = $4
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(score_map_to_json(&next.fav_categories))
        .bind(score_map_to_json(&next.fav_keywords))
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            user_id = %user_id,
            categories = next.fav_categories.len(),
            keywords = next.fav_keywords.len(),
            "User preference updated"
        );

        Ok(next)
    }
}
