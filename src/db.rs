use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::PersistenceError;
use crate::gateway::{GatewayResult, PersistenceGateway};
use crate::models::{
    BadgeId, EngagementState, NewReview, NewStudyUnit, ReviewKind, ReviewRecord, Semester,
    StudyUnit, Topic, TopicKind,
};

type Result<T> = std::result::Result<T, PersistenceError>;

const REVIEW_COLUMNS: &str =
    "r.id, r.topic_id, r.grade, r.scheduled_date, r.completed_date, r.interval_days, r.completed, r.kind";

const UNIT_COLUMNS: &str =
    "id, name, color, year, semester, exam_date, pre_exam_days, continuous_assessment, active";

/// Handle to the SQLite store. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    pub fn init(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS study_units (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                year TEXT NOT NULL,
                semester TEXT NOT NULL CHECK(semester IN ('autumn', 'spring')),
                exam_date TEXT,
                pre_exam_days INTEGER NOT NULL DEFAULT 7,
                continuous_assessment INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                study_unit_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'course' CHECK(kind IN ('course', 'synthesis')),
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (study_unit_id) REFERENCES study_units(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL,
                grade REAL NOT NULL CHECK(grade >= 0 AND grade <= 20),
                scheduled_date TEXT NOT NULL,
                completed_date TEXT,
                interval_days INTEGER NOT NULL CHECK(interval_days >= 1 AND interval_days <= 365),
                completed INTEGER NOT NULL DEFAULT 0,
                kind TEXT NOT NULL DEFAULT 'normal' CHECK(kind IN ('normal', 'pre_exam')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
            );

            -- Single-row aggregate for points, streak and badges
            CREATE TABLE IF NOT EXISTS engagement (
                id INTEGER PRIMARY KEY CHECK(id = 1),
                total_points INTEGER NOT NULL DEFAULT 0,
                streak_days INTEGER NOT NULL DEFAULT 0,
                best_streak INTEGER NOT NULL DEFAULT 0,
                last_activity_date TEXT,
                badges TEXT NOT NULL DEFAULT '[]',
                revision INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT OR IGNORE INTO engagement (id) VALUES (1);

            CREATE INDEX IF NOT EXISTS idx_topics_unit ON topics(study_unit_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_topic ON reviews(topic_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_scheduled ON reviews(completed, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_reviews_completed_date ON reviews(completed, completed_date);
            "#,
        )?;
        self.migrate()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        // Stores created before engagement writes were revisioned
        let has_revision = conn.prepare("SELECT revision FROM engagement LIMIT 1").is_ok();
        if !has_revision {
            conn.execute_batch(
                "ALTER TABLE engagement ADD COLUMN revision INTEGER NOT NULL DEFAULT 0;",
            )?;
        }
        Ok(())
    }

    // Study unit operations
    pub fn add_study_unit(&self, unit: &NewStudyUnit) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO study_units (name, color, year, semester, exam_date, pre_exam_days, continuous_assessment)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                unit.name,
                unit.color,
                unit.year,
                unit.semester.as_str(),
                unit.exam_date,
                unit.pre_exam_days,
                unit.continuous_assessment
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_study_unit(&self, id: i64) -> Result<Option<StudyUnit>> {
        let conn = self.conn()?;
        let unit = conn
            .query_row(
                &format!("SELECT {UNIT_COLUMNS} FROM study_units WHERE id = ?1"),
                params![id],
                unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    pub fn list_active_study_units(&self) -> Result<Vec<StudyUnit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM study_units WHERE active = 1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([], unit_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Logical delete; the unit and its history stay on disk.
    pub fn deactivate_study_unit(&self, id: i64) -> Result<bool> {
        let rows = self.conn()?.execute(
            "UPDATE study_units SET active = 0, updated_at = datetime('now') WHERE id = ?1 AND active = 1",
            params![id],
        )?;
        Ok(rows > 0)
    }

    // Topic operations
    pub fn add_topic(&self, study_unit_id: i64, title: &str, kind: TopicKind) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO topics (study_unit_id, title, kind) VALUES (?1, ?2, ?3)",
            params![study_unit_id, title, kind.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
        let conn = self.conn()?;
        let topic = conn
            .query_row(
                "SELECT id, study_unit_id, title, kind, active FROM topics WHERE id = ?1",
                params![id],
                topic_from_row,
            )
            .optional()?;
        Ok(topic)
    }

    pub fn list_topics(&self, study_unit_id: i64) -> Result<Vec<Topic>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, study_unit_id, title, kind, active
            FROM topics
            WHERE study_unit_id = ?1 AND active = 1
            ORDER BY title
            "#,
        )?;
        let rows = stmt.query_map(params![study_unit_id], topic_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // Review operations
    pub fn insert_review(&self, review: &NewReview) -> Result<i64> {
        let conn = self.conn()?;
        insert_review_row(&conn, review)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_review(&self, id: i64) -> Result<Option<ReviewRecord>> {
        let conn = self.conn()?;
        let review = conn
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews r WHERE r.id = ?1"),
                params![id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    pub fn complete_review(&self, id: i64, grade: f64, completed_date: NaiveDate) -> Result<()> {
        let conn = self.conn()?;
        complete_review_row(&conn, id, grade, completed_date)
    }

    /// Completion and the follow-up review land together or not at all.
    pub fn complete_and_append(
        &self,
        id: i64,
        grade: f64,
        completed_date: NaiveDate,
        next: &NewReview,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        complete_review_row(&tx, id, grade, completed_date)?;
        insert_review_row(&tx, next)?;
        let next_id = tx.last_insert_rowid();
        tx.commit()?;
        debug!(review_id = id, next_id, "completed review and scheduled next");
        Ok(next_id)
    }

    pub fn list_completed_reviews(&self, topic_id: Option<i64>) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn()?;
        let rows = if let Some(topic_id) = topic_id {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {REVIEW_COLUMNS}
                FROM reviews r
                WHERE r.completed = 1 AND r.topic_id = ?1
                ORDER BY r.completed_date ASC, r.id ASC
                "#
            ))?;
            let rows = stmt.query_map(params![topic_id], review_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {REVIEW_COLUMNS}
                FROM reviews r
                WHERE r.completed = 1
                ORDER BY r.completed_date ASC, r.id ASC
                "#
            ))?;
            let rows = stmt.query_map([], review_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    pub fn count_completed_on(&self, date: NaiveDate) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM reviews WHERE completed = 1 AND completed_date = ?1",
            params![date],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub fn list_pending_due(&self, date: NaiveDate) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews r
            JOIN topics t ON r.topic_id = t.id
            JOIN study_units u ON t.study_unit_id = u.id
            WHERE r.completed = 0 AND r.scheduled_date <= ?1
              AND t.active = 1 AND u.active = 1
            ORDER BY r.scheduled_date ASC, r.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![date], review_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_pending_for_topic(&self, topic_id: i64) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews r
            WHERE r.completed = 0 AND r.topic_id = ?1
            ORDER BY r.scheduled_date ASC, r.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![topic_id], review_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // Engagement operations
    pub fn get_engagement(&self) -> Result<EngagementState> {
        Ok(self.get_engagement_with_revision()?.0)
    }

    /// The engagement row and the revision counter it was read at.
    pub fn get_engagement_with_revision(&self) -> Result<(EngagementState, u64)> {
        let conn = self.conn()?;
        let (total_points, streak_days, best_streak, last_activity_date, badges, revision): (
            i64,
            u32,
            u32,
            Option<NaiveDate>,
            String,
            i64,
        ) = conn.query_row(
            r#"
            SELECT total_points, streak_days, best_streak, last_activity_date, badges, revision
            FROM engagement
            WHERE id = 1
            "#,
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        let badges: Vec<BadgeId> = serde_json::from_str(&badges)?;
        let state = EngagementState {
            total_points: u64::try_from(total_points).unwrap_or(0),
            streak_days,
            best_streak,
            last_activity_date,
            unlocked_badges: badges.into_iter().collect(),
        };
        Ok((state, u64::try_from(revision).unwrap_or(0)))
    }

    /// Unconditional overwrite. Still bumps the revision so in-flight
    /// conditional writers notice.
    pub fn save_engagement(&self, state: &EngagementState) -> Result<()> {
        let conn = self.conn()?;
        write_engagement_row(&conn, state, None)?;
        Ok(())
    }

    /// Write `state` only if nobody has written since `expected` was read.
    /// Returns false and changes nothing when the revision moved on.
    pub fn replace_engagement(&self, state: &EngagementState, expected: u64) -> Result<bool> {
        let conn = self.conn()?;
        let written = write_engagement_row(&conn, state, Some(expected))?;
        if !written {
            debug!(expected, "engagement revision moved on, write skipped");
        }
        Ok(written)
    }

    /// Run `f` on the blocking thread pool against a clone of this handle.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

fn write_engagement_row(
    conn: &Connection,
    state: &EngagementState,
    expected: Option<u64>,
) -> Result<bool> {
    let badges = serde_json::to_string(&state.unlocked_badges)?;
    let total_points = i64::try_from(state.total_points).unwrap_or(i64::MAX);
    let expected = expected.map(|r| i64::try_from(r).unwrap_or(i64::MAX));
    let rows = conn.execute(
        r#"
        UPDATE engagement
        SET total_points = ?1,
            streak_days = ?2,
            best_streak = ?3,
            last_activity_date = ?4,
            badges = ?5,
            revision = revision + 1,
            updated_at = datetime('now')
        WHERE id = 1 AND (?6 IS NULL OR revision = ?6)
        "#,
        params![
            total_points,
            state.streak_days,
            state.best_streak,
            state.last_activity_date,
            badges,
            expected
        ],
    )?;
    Ok(rows == 1)
}

fn insert_review_row(conn: &Connection, review: &NewReview) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO reviews (topic_id, grade, scheduled_date, interval_days, kind)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            review.topic_id,
            review.grade,
            review.scheduled_date,
            review.interval_days,
            review.kind.as_str()
        ],
    )?;
    Ok(())
}

fn complete_review_row(
    conn: &Connection,
    id: i64,
    grade: f64,
    completed_date: NaiveDate,
) -> Result<()> {
    let rows = conn.execute(
        r#"
        UPDATE reviews
        SET completed = 1,
            grade = ?1,
            completed_date = ?2,
            updated_at = datetime('now')
        WHERE id = ?3 AND completed = 0
        "#,
        params![grade, completed_date, id],
    )?;
    if rows == 0 {
        return Err(PersistenceError::NotPending(id));
    }
    Ok(())
}

fn text_enum<T>(idx: usize, value: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{value}'").into(),
        )
    })
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<StudyUnit> {
    Ok(StudyUnit {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        year: row.get(3)?,
        semester: text_enum(4, row.get(4)?, Semester::from_str)?,
        exam_date: row.get(5)?,
        pre_exam_days: row.get(6)?,
        continuous_assessment: row.get(7)?,
        active: row.get(8)?,
    })
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        study_unit_id: row.get(1)?,
        title: row.get(2)?,
        kind: text_enum(3, row.get(3)?, TopicKind::from_str)?,
        active: row.get(4)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    Ok(ReviewRecord {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        grade: row.get(2)?,
        scheduled_date: row.get(3)?,
        completed_date: row.get(4)?,
        interval_days: row.get(5)?,
        completed: row.get(6)?,
        kind: text_enum(7, row.get(7)?, ReviewKind::from_str)?,
    })
}

#[async_trait]
impl PersistenceGateway for Database {
    async fn completed_reviews(&self, topic_id: i64) -> GatewayResult<Vec<ReviewRecord>> {
        self.blocking(move |db| db.list_completed_reviews(Some(topic_id)))
            .await
    }

    async fn all_completed_reviews(&self) -> GatewayResult<Vec<ReviewRecord>> {
        self.blocking(|db| db.list_completed_reviews(None)).await
    }

    async fn completed_count_on(&self, date: NaiveDate) -> GatewayResult<u32> {
        self.blocking(move |db| db.count_completed_on(date)).await
    }

    async fn active_study_units(&self) -> GatewayResult<Vec<StudyUnit>> {
        self.blocking(|db| db.list_active_study_units()).await
    }

    async fn study_unit(&self, id: i64) -> GatewayResult<Option<StudyUnit>> {
        self.blocking(move |db| db.get_study_unit(id)).await
    }

    async fn topic(&self, id: i64) -> GatewayResult<Option<Topic>> {
        self.blocking(move |db| db.get_topic(id)).await
    }

    async fn topics_for_unit(&self, study_unit_id: i64) -> GatewayResult<Vec<Topic>> {
        self.blocking(move |db| db.list_topics(study_unit_id)).await
    }

    async fn review(&self, id: i64) -> GatewayResult<Option<ReviewRecord>> {
        self.blocking(move |db| db.get_review(id)).await
    }

    async fn pending_reviews_due(&self, date: NaiveDate) -> GatewayResult<Vec<ReviewRecord>> {
        self.blocking(move |db| db.list_pending_due(date)).await
    }

    async fn pending_reviews_for_topic(&self, topic_id: i64) -> GatewayResult<Vec<ReviewRecord>> {
        self.blocking(move |db| db.list_pending_for_topic(topic_id))
            .await
    }

    async fn engagement_state(&self) -> GatewayResult<EngagementState> {
        self.blocking(|db| db.get_engagement()).await
    }

    async fn engagement_with_revision(&self) -> GatewayResult<(EngagementState, u64)> {
        self.blocking(|db| db.get_engagement_with_revision()).await
    }

    async fn set_engagement_state(&self, state: &EngagementState) -> GatewayResult<()> {
        let state = state.clone();
        self.blocking(move |db| db.save_engagement(&state)).await
    }

    async fn replace_engagement_state(
        &self,
        state: &EngagementState,
        expected_revision: u64,
    ) -> GatewayResult<bool> {
        let state = state.clone();
        self.blocking(move |db| db.replace_engagement(&state, expected_revision))
            .await
    }

    async fn append_review(&self, review: &NewReview) -> GatewayResult<i64> {
        let review = review.clone();
        self.blocking(move |db| db.insert_review(&review)).await
    }

    async fn mark_review_completed(
        &self,
        id: i64,
        grade: f64,
        completed_date: NaiveDate,
    ) -> GatewayResult<()> {
        self.blocking(move |db| db.complete_review(id, grade, completed_date))
            .await
    }

    async fn complete_and_reschedule(
        &self,
        id: i64,
        grade: f64,
        completed_date: NaiveDate,
        next: &NewReview,
    ) -> GatewayResult<i64> {
        let next = next.clone();
        self.blocking(move |db| db.complete_and_append(id, grade, completed_date, &next))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_unit(name: &str, exam_date: Option<&str>) -> NewStudyUnit {
        NewStudyUnit {
            name: name.to_string(),
            color: "#3366ff".to_string(),
            year: "2A".to_string(),
            semester: Semester::Spring,
            exam_date: exam_date.map(day),
            pre_exam_days: 7,
            continuous_assessment: false,
        }
    }

    fn pending(topic_id: i64, grade: f64, scheduled: &str) -> NewReview {
        NewReview {
            topic_id,
            grade,
            scheduled_date: day(scheduled),
            interval_days: 7,
            kind: ReviewKind::Normal,
        }
    }

    fn seed_topic(db: &Database) -> i64 {
        let unit = db.add_study_unit(&new_unit("Physiology", None)).unwrap();
        db.add_topic(unit, "Kidney", TopicKind::Course).unwrap()
    }

    mod init_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            let conn = db.conn().unwrap();
            for table in ["study_units", "topics", "reviews", "engagement"] {
                let count: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })
                    .unwrap_or_else(|_| panic!("{table} table should exist"));
                let expected = if table == "engagement" { 1 } else { 0 };
                assert_eq!(count, expected, "unexpected row count in {table}");
            }
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            db.add_study_unit(&new_unit("Test", None)).unwrap();

            db.init().expect("Re-init should succeed");

            assert_eq!(db.list_active_study_units().unwrap().len(), 1);
            let rows: i64 = db
                .conn()
                .unwrap()
                .query_row("SELECT COUNT(*) FROM engagement", [], |row| row.get(0))
                .unwrap();
            assert_eq!(rows, 1);
        }
    }

    mod study_unit_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn add_and_get_round_trip() {
            let db = setup_db();
            let id = db
                .add_study_unit(&new_unit("Biochemistry", Some("2024-06-20")))
                .unwrap();

            let unit = db.get_study_unit(id).unwrap().unwrap();
            assert_eq!(unit.name, "Biochemistry");
            assert_eq!(unit.semester, Semester::Spring);
            assert_eq!(unit.exam_date, Some(day("2024-06-20")));
            assert_eq!(unit.pre_exam_days, 7);
            assert!(unit.active);
        }

        #[test]
        fn get_missing_unit_is_none() {
            assert!(setup_db().get_study_unit(99).unwrap().is_none());
        }

        #[test]
        fn list_active_sorted_by_name() {
            let db = setup_db();
            db.add_study_unit(&new_unit("Zoology", None)).unwrap();
            db.add_study_unit(&new_unit("Anatomy", None)).unwrap();

            let names: Vec<String> = db
                .list_active_study_units()
                .unwrap()
                .into_iter()
                .map(|u| u.name)
                .collect();
            assert_eq!(names, vec!["Anatomy", "Zoology"]);
        }

        #[test]
        fn deactivate_hides_unit_but_keeps_row() {
            let db = setup_db();
            let id = db.add_study_unit(&new_unit("Anatomy", None)).unwrap();

            assert!(db.deactivate_study_unit(id).unwrap());
            assert!(!db.deactivate_study_unit(id).unwrap());
            assert!(db.list_active_study_units().unwrap().is_empty());
            assert!(!db.get_study_unit(id).unwrap().unwrap().active);
        }
    }

    mod topic_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn add_topic_basic() {
            let db = setup_db();
            let unit = db.add_study_unit(&new_unit("Anatomy", None)).unwrap();
            let id = db.add_topic(unit, "Skull", TopicKind::Synthesis).unwrap();

            let topic = db.get_topic(id).unwrap().unwrap();
            assert_eq!(topic.title, "Skull");
            assert_eq!(topic.kind, TopicKind::Synthesis);
            assert_eq!(topic.study_unit_id, unit);
            assert!(topic.active);
        }

        #[test]
        fn topic_requires_existing_unit() {
            let db = setup_db();
            assert!(db.add_topic(42, "Orphan", TopicKind::Course).is_err());
        }

        #[test]
        fn list_topics_scoped_to_unit() {
            let db = setup_db();
            let a = db.add_study_unit(&new_unit("A", None)).unwrap();
            let b = db.add_study_unit(&new_unit("B", None)).unwrap();
            db.add_topic(a, "Two", TopicKind::Course).unwrap();
            db.add_topic(a, "One", TopicKind::Course).unwrap();
            db.add_topic(b, "Other", TopicKind::Course).unwrap();

            let titles: Vec<String> = db
                .list_topics(a)
                .unwrap()
                .into_iter()
                .map(|t| t.title)
                .collect();
            assert_eq!(titles, vec!["One", "Two"]);
        }
    }

    mod review_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn insert_and_get_pending() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 11.5, "2024-05-01")).unwrap();

            let r = db.get_review(id).unwrap().unwrap();
            assert_eq!(r.grade, 11.5);
            assert_eq!(r.scheduled_date, day("2024-05-01"));
            assert!(!r.completed);
            assert!(r.completed_date.is_none());
            assert_eq!(r.kind, ReviewKind::Normal);
        }

        #[test]
        fn grade_out_of_range_rejected_by_schema() {
            let db = setup_db();
            let topic = seed_topic(&db);
            assert!(db.insert_review(&pending(topic, 21.0, "2024-05-01")).is_err());
        }

        #[test]
        fn interval_out_of_range_rejected_by_schema() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let mut review = pending(topic, 10.0, "2024-05-01");
            review.interval_days = 0;
            assert!(db.insert_review(&review).is_err());
        }

        #[test]
        fn complete_sets_date_and_grade() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();

            db.complete_review(id, 14.5, day("2024-05-02")).unwrap();

            let r = db.get_review(id).unwrap().unwrap();
            assert!(r.completed);
            assert_eq!(r.grade, 14.5);
            assert_eq!(r.completed_date, Some(day("2024-05-02")));
        }

        #[test]
        fn completing_twice_fails() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();

            db.complete_review(id, 14.5, day("2024-05-02")).unwrap();
            assert!(matches!(
                db.complete_review(id, 15.0, day("2024-05-03")),
                Err(PersistenceError::NotPending(n)) if n == id
            ));
        }

        #[test]
        fn complete_and_append_on_completed_review_inserts_nothing() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();
            db.complete_review(id, 14.5, day("2024-05-02")).unwrap();

            let result =
                db.complete_and_append(id, 12.0, day("2024-05-03"), &pending(topic, 12.0, "2024-05-15"));

            assert!(matches!(result, Err(PersistenceError::NotPending(_))));
            assert!(db.list_pending_for_topic(topic).unwrap().is_empty());
        }

        #[test]
        fn complete_and_append_is_atomic() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();

            // invalid follow-up grade trips the CHECK constraint
            let bad_next = pending(topic, 25.0, "2024-05-10");
            assert!(db
                .complete_and_append(id, 12.0, day("2024-05-01"), &bad_next)
                .is_err());

            let r = db.get_review(id).unwrap().unwrap();
            assert!(!r.completed, "completion must roll back with the insert");
            assert_eq!(db.list_pending_for_topic(topic).unwrap().len(), 1);
        }

        #[test]
        fn complete_and_append_success() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();

            let next = db
                .complete_and_append(id, 12.0, day("2024-05-01"), &pending(topic, 12.0, "2024-05-15"))
                .unwrap();

            assert!(db.get_review(id).unwrap().unwrap().completed);
            let next = db.get_review(next).unwrap().unwrap();
            assert!(!next.completed);
            assert_eq!(next.scheduled_date, day("2024-05-15"));
        }

        #[test]
        fn completed_history_ordered_by_completion() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let late = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();
            let early = db.insert_review(&pending(topic, 9.0, "2024-05-01")).unwrap();
            db.complete_review(late, 15.0, day("2024-05-09")).unwrap();
            db.complete_review(early, 10.0, day("2024-05-03")).unwrap();

            let grades: Vec<f64> = db
                .list_completed_reviews(Some(topic))
                .unwrap()
                .into_iter()
                .map(|r| r.grade)
                .collect();
            assert_eq!(grades, vec![10.0, 15.0]);
        }

        #[test]
        fn count_completed_on_date() {
            let db = setup_db();
            let topic = seed_topic(&db);
            for _ in 0..2 {
                let id = db.insert_review(&pending(topic, 8.0, "2024-05-01")).unwrap();
                db.complete_review(id, 12.0, day("2024-05-04")).unwrap();
            }
            assert_eq!(db.count_completed_on(day("2024-05-04")).unwrap(), 2);
            assert_eq!(db.count_completed_on(day("2024-05-05")).unwrap(), 0);
        }

        #[test]
        fn pending_due_skips_future_and_inactive() {
            let db = setup_db();
            let active_unit = db.add_study_unit(&new_unit("Active", None)).unwrap();
            let dead_unit = db.add_study_unit(&new_unit("Dead", None)).unwrap();
            let live = db.add_topic(active_unit, "Live", TopicKind::Course).unwrap();
            let dead = db.add_topic(dead_unit, "Dead", TopicKind::Course).unwrap();

            db.insert_review(&pending(live, 10.0, "2024-05-01")).unwrap();
            db.insert_review(&pending(live, 10.0, "2024-05-10")).unwrap();
            db.insert_review(&pending(live, 10.0, "2024-05-11")).unwrap();
            db.insert_review(&pending(dead, 10.0, "2024-05-01")).unwrap();
            db.deactivate_study_unit(dead_unit).unwrap();

            let due = db.list_pending_due(day("2024-05-10")).unwrap();
            assert_eq!(due.len(), 2);
            assert!(due.iter().all(|r| r.topic_id == live));
        }
    }

    mod engagement_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn default_state_after_init() {
            let db = setup_db();
            assert_eq!(db.get_engagement().unwrap(), EngagementState::default());
        }

        #[test]
        fn save_round_trips_all_fields() {
            let db = setup_db();
            let state = EngagementState {
                total_points: 1234,
                streak_days: 8,
                best_streak: 12,
                last_activity_date: Some(day("2024-05-04")),
                unlocked_badges: [BadgeId::Streak7, BadgeId::PerfectScore]
                    .into_iter()
                    .collect(),
            };
            db.save_engagement(&state).unwrap();
            assert_eq!(db.get_engagement().unwrap(), state);
        }

        #[test]
        fn badges_stored_as_json_ids() {
            let db = setup_db();
            let state = EngagementState {
                unlocked_badges: [BadgeId::Scholar].into_iter().collect(),
                ..EngagementState::default()
            };
            db.save_engagement(&state).unwrap();

            let raw: String = db
                .conn()
                .unwrap()
                .query_row("SELECT badges FROM engagement WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(raw, "[\"SCHOLAR\"]");
        }

        #[test]
        fn every_write_bumps_revision() {
            let db = setup_db();
            let (_, start) = db.get_engagement_with_revision().unwrap();

            db.save_engagement(&EngagementState::default()).unwrap();
            let (_, after_save) = db.get_engagement_with_revision().unwrap();
            assert_eq!(after_save, start + 1);

            assert!(db
                .replace_engagement(&EngagementState::default(), after_save)
                .unwrap());
            let (_, after_replace) = db.get_engagement_with_revision().unwrap();
            assert_eq!(after_replace, after_save + 1);
        }

        #[test]
        fn stale_revision_is_rejected() {
            let db = setup_db();
            let (mut mine, seen) = db.get_engagement_with_revision().unwrap();

            let theirs = EngagementState {
                total_points: 7,
                ..EngagementState::default()
            };
            db.save_engagement(&theirs).unwrap();

            mine.total_points = 5;
            assert!(!db.replace_engagement(&mine, seen).unwrap());
            assert_eq!(db.get_engagement().unwrap().total_points, 7);
        }

        #[test]
        fn init_adds_revision_to_older_store() {
            let db = Database::open(":memory:").unwrap();
            db.conn()
                .unwrap()
                .execute_batch(
                    r#"
                    CREATE TABLE engagement (
                        id INTEGER PRIMARY KEY CHECK(id = 1),
                        total_points INTEGER NOT NULL DEFAULT 0,
                        streak_days INTEGER NOT NULL DEFAULT 0,
                        best_streak INTEGER NOT NULL DEFAULT 0,
                        last_activity_date TEXT,
                        badges TEXT NOT NULL DEFAULT '[]',
                        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                    );
                    INSERT INTO engagement (id, total_points) VALUES (1, 30);
                    "#,
                )
                .unwrap();

            db.init().unwrap();

            let (state, revision) = db.get_engagement_with_revision().unwrap();
            assert_eq!(state.total_points, 30);
            assert_eq!(revision, 0);
        }
    }

    mod file_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn data_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("cadence.db");

            {
                let db = Database::open(&path).unwrap();
                db.init().unwrap();
                let topic = seed_topic(&db);
                db.insert_review(&pending(topic, 12.0, "2024-05-01")).unwrap();
                let state = EngagementState {
                    total_points: 42,
                    ..EngagementState::default()
                };
                db.save_engagement(&state).unwrap();
            }

            let db = Database::open(&path).unwrap();
            db.init().unwrap();
            assert_eq!(db.list_pending_due(day("2024-05-01")).unwrap().len(), 1);
            assert_eq!(db.get_engagement().unwrap().total_points, 42);
        }
    }

    mod gateway_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn gateway_delegates_to_store() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let gw: &dyn PersistenceGateway = &db;

            let id = gw.append_review(&pending(topic, 9.0, "2024-05-01")).await.unwrap();
            gw.mark_review_completed(id, 13.0, day("2024-05-02")).await.unwrap();

            let history = gw.completed_reviews(topic).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].grade, 13.0);
            assert_eq!(gw.completed_count_on(day("2024-05-02")).await.unwrap(), 1);
            assert!(gw.topic(topic).await.unwrap().is_some());
            assert_eq!(gw.active_study_units().await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn clones_share_one_store() {
            let db = setup_db();
            let topic = seed_topic(&db);
            let other = db.clone();

            let id = other
                .append_review(&pending(topic, 9.0, "2024-05-01"))
                .await
                .unwrap();

            assert!(db.get_review(id).unwrap().is_some());
        }

        #[tokio::test]
        async fn conditional_write_through_gateway() {
            let db = setup_db();
            let gw: &dyn PersistenceGateway = &db;
            let (mut state, revision) = gw.engagement_with_revision().await.unwrap();
            state.total_points = 12;

            assert!(gw.replace_engagement_state(&state, revision).await.unwrap());
            assert!(!gw.replace_engagement_state(&state, revision).await.unwrap());
            assert_eq!(gw.engagement_state().await.unwrap().total_points, 12);
        }
    }
}
