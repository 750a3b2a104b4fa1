use chrono::{DateTime, NaiveDate, Utc};
use lifeos_core::{
    AccessControl, CardEntry, CardId, CardLearningState, CardStore, CoreError, Flashcard,
    LearningStage, ProjectId, ReviewedState, UserId, Versioned,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error};

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        debug!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(repo)
    }

    /// Each in-memory connection is its own database, so the pool is pinned
    /// to a single connection that never expires.
    pub async fn open_memory() -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage("sqlite options"))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Underlying pool, for maintenance queries outside the store API.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        // A learning-state row with NULL repetitions is an unreviewed state.
        const STMT: &str = r#"
        CREATE TABLE IF NOT EXISTS cards (
          id          TEXT PRIMARY KEY,
          project_id  TEXT NOT NULL,
          front       TEXT NOT NULL,
          back        TEXT NOT NULL,
          hint        TEXT,
          tags        TEXT NOT NULL,
          created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS learning_states (
          user_id           TEXT NOT NULL,
          card_id           TEXT NOT NULL,
          version           INTEGER NOT NULL,
          repetitions       INTEGER,
          interval_days     INTEGER,
          ease_factor       REAL,
          learning_stage    TEXT,
          next_review_on    TEXT,
          total_reviews     INTEGER,
          total_correct     INTEGER,
          last_reviewed_at  TEXT,
          PRIMARY KEY (user_id, card_id),
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS memberships (
          user_id     TEXT NOT NULL,
          project_id  TEXT NOT NULL,
          PRIMARY KEY (user_id, project_id)
        );

        CREATE INDEX IF NOT EXISTS idx_cards_project ON cards (project_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_states_user_due ON learning_states (user_id, next_review_on);
        "#;

        // Execute statements one by one for compatibility.
        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(storage("sqlite schema"))?;
        }
        Ok(())
    }

    async fn card_exists(&self, id: CardId) -> Result<bool, CoreError> {
        Ok(sqlx::query("SELECT 1 FROM cards WHERE id=? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read card"))?
            .is_some())
    }
}

#[async_trait::async_trait]
impl CardStore for SqliteRepo {
    // ===== Cards =====
    async fn add_card(
        &self,
        project_id: ProjectId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard, CoreError> {
        let mut card = Flashcard::new(project_id, front, back, created_at);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        let tags_json =
            serde_json::to_string(&card.tags).map_err(|_| CoreError::Storage("encode tags"))?;

        sqlx::query(
            r#"INSERT INTO cards (id, project_id, front, back, hint, tags, created_at)
               VALUES (?,?,?,?,?,?,?)"#,
        )
        .bind(card.id.to_string())
        .bind(card.project_id.to_string())
        .bind(&card.front)
        .bind(&card.back)
        .bind(card.hint.clone())
        .bind(tags_json)
        .bind(dt_to_str(card.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage("insert card"))?;

        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Flashcard, CoreError> {
        let row = sqlx::query(
            "SELECT id,project_id,front,back,hint,tags,created_at FROM cards WHERE id=?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(&row)
    }

    async fn list_cards(&self, project_id: Option<ProjectId>) -> Result<Vec<Flashcard>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT id,project_id,front,back,hint,tags,created_at
               FROM cards WHERE (?1 IS NULL OR project_id = ?1)
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(project_id.map(|p| p.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list cards"))?;
        rows.iter().map(row_into_card).collect()
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(storage("tx"))?;

        // Manual cascade (robust even if PRAGMA foreign_keys is off)
        sqlx::query("DELETE FROM learning_states WHERE card_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del states"))?;
        let res = sqlx::query("DELETE FROM cards WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage("del card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        tx.commit().await.map_err(storage("tx commit"))
    }

    // ===== Learning states =====
    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Versioned<CardLearningState>, CoreError> {
        let row = sqlx::query(
            r#"SELECT version,repetitions,interval_days,ease_factor,learning_stage,
                      next_review_on,total_reviews,total_correct,last_reviewed_at
               FROM learning_states WHERE user_id=? AND card_id=?"#,
        )
        .bind(user_id.to_string())
        .bind(card_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("read state"))?;
        match row {
            Some(row) => row_into_state(&row),
            None => Ok(Versioned::new(CardLearningState::Unreviewed, 0)),
        }
    }

    async fn put_state(
        &self,
        user_id: UserId,
        card_id: CardId,
        expected_version: u64,
        state: &CardLearningState,
    ) -> Result<u64, CoreError> {
        if !self.card_exists(card_id).await? {
            return Err(CoreError::NotFound("card"));
        }
        let r = state.reviewed();
        let version = expected_version + 1;
        let res = if expected_version == 0 {
            sqlx::query(
                r#"INSERT INTO learning_states (
                     version, repetitions, interval_days, ease_factor, learning_stage,
                     next_review_on, total_reviews, total_correct, last_reviewed_at,
                     user_id, card_id
                   )
                   SELECT ?,?,?,?,?,?,?,?,?,?,? WHERE ? = 0
                   ON CONFLICT(user_id, card_id) DO NOTHING"#,
            )
        } else {
            sqlx::query(
                r#"UPDATE learning_states SET
                     version=?, repetitions=?, interval_days=?, ease_factor=?, learning_stage=?,
                     next_review_on=?, total_reviews=?, total_correct=?, last_reviewed_at=?
                   WHERE user_id=? AND card_id=? AND version=?"#,
            )
        }
        .bind(version as i64)
        .bind(r.map(|s| s.repetitions as i64))
        .bind(r.map(|s| s.interval_days as i64))
        .bind(r.map(|s| s.ease_factor))
        .bind(r.map(|s| stage_to_str(s.learning_stage)))
        .bind(r.map(|s| s.next_review_on.to_string()))
        .bind(r.map(|s| s.total_reviews as i64))
        .bind(r.map(|s| s.total_correct as i64))
        .bind(r.map(|s| dt_to_str(s.last_reviewed_at)))
        .bind(user_id.to_string())
        .bind(card_id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(storage("write state"))?;

        if res.rows_affected() == 0 {
            return Err(CoreError::Conflict("learning state changed since it was read"));
        }
        Ok(version)
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<CardEntry>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT c.id AS id, c.project_id AS project_id, c.front AS front, c.back AS back,
                      c.hint AS hint, c.tags AS tags, c.created_at AS created_at,
                      s.version AS version, s.repetitions AS repetitions,
                      s.interval_days AS interval_days, s.ease_factor AS ease_factor,
                      s.learning_stage AS learning_stage, s.next_review_on AS next_review_on,
                      s.total_reviews AS total_reviews, s.total_correct AS total_correct,
                      s.last_reviewed_at AS last_reviewed_at
               FROM cards c
               LEFT JOIN learning_states s ON s.card_id = c.id AND s.user_id = ?1
               WHERE (?2 IS NULL OR c.project_id = ?2)
               ORDER BY c.created_at ASC, c.id ASC"#,
        )
        .bind(user_id.to_string())
        .bind(project_id.map(|p| p.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list entries"))?;

        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            let card = row_into_card(&row)?;
            let state = if row.get::<Option<i64>, _>("version").is_some() {
                row_into_state(&row)?
            } else {
                Versioned::new(CardLearningState::Unreviewed, 0)
            };
            v.push(CardEntry { card, state });
        }
        Ok(v)
    }
}

#[async_trait::async_trait]
impl AccessControl for SqliteRepo {
    async fn has_access(&self, user_id: UserId, project_id: ProjectId) -> Result<bool, CoreError> {
        Ok(
            sqlx::query("SELECT 1 FROM memberships WHERE user_id=? AND project_id=? LIMIT 1")
                .bind(user_id.to_string())
                .bind(project_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("read membership"))?
                .is_some(),
        )
    }

    async fn grant(&self, user_id: UserId, project_id: ProjectId) -> Result<(), CoreError> {
        sqlx::query("INSERT OR IGNORE INTO memberships (user_id, project_id) VALUES (?,?)")
            .bind(user_id.to_string())
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage("insert membership"))?;
        Ok(())
    }
}

// ===== Helpers =====
fn storage(what: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        error!("sqlite {what}: {e}");
        CoreError::Storage(what)
    }
}

fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Storage("corrupt uuid"))
}

fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Storage("corrupt datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_from_str(s: String) -> Result<NaiveDate, CoreError> {
    s.parse::<NaiveDate>()
        .map_err(|_| CoreError::Storage("corrupt date"))
}

fn stage_to_str(stage: LearningStage) -> &'static str {
    match stage {
        LearningStage::New => "new",
        LearningStage::Learning => "learning",
        LearningStage::Review => "review",
        LearningStage::Mastered => "mastered",
    }
}

fn stage_from_str(s: &str) -> Option<LearningStage> {
    match s {
        "new" => Some(LearningStage::New),
        "learning" => Some(LearningStage::Learning),
        "review" => Some(LearningStage::Review),
        "mastered" => Some(LearningStage::Mastered),
        _ => None,
    }
}

fn row_into_card(row: &SqliteRow) -> Result<Flashcard, CoreError> {
    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Flashcard {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        project_id: uuid_from_str(row.get::<String, _>("project_id"))?,
        front: row.get::<String, _>("front"),
        back: row.get::<String, _>("back"),
        hint: row.get::<Option<String>, _>("hint"),
        tags,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_state(row: &SqliteRow) -> Result<Versioned<CardLearningState>, CoreError> {
    let corrupt = || CoreError::Storage("corrupt learning state");
    let count = |column: &str| -> Result<u32, CoreError> {
        let raw = row.get::<Option<i64>, _>(column).ok_or_else(corrupt)?;
        u32::try_from(raw).map_err(|_| corrupt())
    };

    let version = u64::try_from(row.get::<i64, _>("version")).map_err(|_| corrupt())?;
    if row.get::<Option<i64>, _>("repetitions").is_none() {
        return Ok(Versioned::new(CardLearningState::Unreviewed, version));
    }

    let stage_text: String = row
        .get::<Option<String>, _>("learning_stage")
        .ok_or_else(corrupt)?;
    let state = ReviewedState {
        repetitions: count("repetitions")?,
        interval_days: count("interval_days")?,
        ease_factor: row
            .get::<Option<f64>, _>("ease_factor")
            .ok_or_else(corrupt)?,
        learning_stage: stage_from_str(&stage_text).ok_or_else(corrupt)?,
        next_review_on: date_from_str(
            row.get::<Option<String>, _>("next_review_on")
                .ok_or_else(corrupt)?,
        )?,
        total_reviews: count("total_reviews")?,
        total_correct: count("total_correct")?,
        last_reviewed_at: dt_from_str(
            row.get::<Option<String>, _>("last_reviewed_at")
                .ok_or_else(corrupt)?,
        )?,
    };
    state.validate().map_err(|_| corrupt())?;
    Ok(Versioned::new(CardLearningState::Reviewed(state), version))
}
