use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Category, EntryWindow, GradeRecord, GradeWrite, RecordFilter, WriteSummary};
use crate::normalize::{normalize_label, normalize_score};
use crate::repo::GradeRepository;
use crate::sheet;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgGradeStore {
    pool: PgPool,
}

impl PgGradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let rows = vec![
        ("Ana Souza", "2025001", "6º ANO", "MANHÃ", "1º", "MATEMÁTICA", Category::Monthly, "6,0"),
        ("Ana Souza", "2025001", "6º ANO", "MANHÃ", "1º", "MATEMÁTICA", Category::Bimonthly, "10"),
        ("Ana Souza", "2025001", "6º ANO", "MANHÃ", "1º", "CIÊNCIAS", Category::Monthly, "4"),
        ("Ana Souza", "2025001", "6º ANO", "MANHÃ", "1º", "CIÊNCIAS", Category::Bimonthly, "5/0"),
        ("Ana Souza", "2025001", "6º ANO", "MANHÃ", "1º", "CIÊNCIAS", Category::Recovery, "9,0"),
        ("Bruno Lima", "2025002", "6º ANO", "MANHÃ", "1º", "MATEMÁTICA", Category::Monthly, "7.5"),
        ("Bruno Lima", "2025002", "6º ANO", "MANHÃ", "1º", "MATEMÁTICA", Category::Bimonthly, "6"),
        ("Bruno Lima", "2025002", "6º ANO", "MANHÃ", "1º", "CIÊNCIAS", Category::Monthly, "8"),
        ("Carol Dias", "2025010", "7º ANO", "TARDE", "1º", "HISTÓRIA", Category::Monthly, "9,5"),
        ("Carol Dias", "2025010", "7º ANO", "TARDE", "1º", "HISTÓRIA", Category::Bimonthly, "8"),
    ];

    let teacher_for = |subject: &str| match subject {
        "MATEMÁTICA" => ("Carla Mendes", "P100"),
        "CIÊNCIAS" => ("Diego Rocha", "P200"),
        _ => ("Elisa Prado", "P300"),
    };

    let mut tx = pool.begin().await?;
    let existing: i64 = sqlx::query("SELECT COUNT(*) AS total FROM gradebook.grades")
        .fetch_one(&mut *tx)
        .await?
        .get("total");
    if existing > 0 {
        info!(existing, "Grades already present, skipping seed rows");
    } else {
        for (name, id, grade_level, shift, period, subject, category, score) in rows {
            let (teacher_name, teacher_id) = teacher_for(subject);
            insert_grade(
                &mut tx,
                name,
                id,
                grade_level,
                shift,
                period,
                subject,
                category,
                score,
                teacher_name,
                teacher_id,
            )
            .await?;
        }
        bump_version(&mut tx).await?;
    }

    for (period, opens_on, closes_on) in [
        ("1º", (2026, 2, 2), (2026, 12, 18)),
        ("2º", (2026, 4, 27), (2026, 12, 18)),
    ] {
        let window = EntryWindow {
            period: period.to_string(),
            opens_on: NaiveDate::from_ymd_opt(opens_on.0, opens_on.1, opens_on.2)
                .context("invalid date")?,
            closes_on: NaiveDate::from_ymd_opt(closes_on.0, closes_on.1, closes_on.2)
                .context("invalid date")?,
        };
        upsert_window(&mut *tx, &window).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[tracing::instrument(skip(pool), fields(path = %csv_path.display()))]
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let batch_id = Uuid::new_v4();
    let rows = sheet::read_sheet_rows(csv_path)?;
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for (index, row) in rows.into_iter().enumerate() {
        let category: Category = match row.category.parse() {
            Ok(category) => category,
            Err(err) => {
                warn!(%batch_id, line = index + 2, error = %err, "Skipping grade row");
                continue;
            }
        };

        insert_grade(
            &mut tx,
            row.student_name.trim(),
            &normalize_label(&row.student_id),
            &normalize_label(&row.grade_level),
            &normalize_label(&row.shift),
            &normalize_label(&row.period),
            &normalize_label(&row.subject),
            category,
            row.score.as_deref().unwrap_or("").trim(),
            row.teacher_name.trim(),
            &normalize_label(&row.teacher_id),
        )
        .await?;
        inserted += 1;
    }

    if inserted > 0 {
        bump_version(&mut tx).await?;
    }
    tx.commit().await?;
    info!(%batch_id, inserted, "Grade sheet imported");
    Ok(inserted)
}

#[allow(clippy::too_many_arguments)]
async fn insert_grade(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    student_name: &str,
    student_id: &str,
    grade_level: &str,
    shift: &str,
    period: &str,
    subject: &str,
    category: Category,
    score: &str,
    teacher_name: &str,
    teacher_id: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gradebook.grades
        (student_name, student_id, grade_level, shift, period, subject, category, score, teacher_name, teacher_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(student_name)
    .bind(student_id)
    .bind(grade_level)
    .bind(shift)
    .bind(period)
    .bind(subject)
    .bind(category.as_str())
    .bind(score)
    .bind(teacher_name)
    .bind(teacher_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn bump_version(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> anyhow::Result<()> {
    sqlx::query("UPDATE gradebook.store_state SET version = version + 1 WHERE id = 1")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn upsert_window<'e, E>(executor: E, window: &EntryWindow) -> anyhow::Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO gradebook.entry_windows (period, opens_on, closes_on)
        VALUES ($1, $2, $3)
        ON CONFLICT (period) DO UPDATE
        SET opens_on = EXCLUDED.opens_on, closes_on = EXCLUDED.closes_on
        "#,
    )
    .bind(normalize_label(&window.period))
    .bind(window.opens_on)
    .bind(window.closes_on)
    .execute(executor)
    .await?;
    Ok(())
}

// Student names are compared in Rust, since `upper()` under a C collation
// leaves accented letters untouched.
fn select_query(filter: &RecordFilter) -> (String, Vec<String>) {
    let mut query = String::from(
        "SELECT g.student_name, g.student_id, g.grade_level, g.shift, g.period, \
         g.subject, g.category, g.score, g.teacher_name, g.teacher_id \
         FROM gradebook.grades g \
         WHERE TRUE",
    );

    let mut binds: Vec<String> = Vec::new();
    let label_columns = [
        ("g.grade_level", &filter.grade_level),
        ("g.student_id", &filter.student_id),
        ("g.period", &filter.period),
        ("g.teacher_id", &filter.teacher_id),
    ];
    for (column, value) in label_columns {
        if let Some(value) = value {
            binds.push(normalize_label(value));
            query.push_str(&format!(" AND upper(trim({column})) = ${}", binds.len()));
        }
    }
    query.push_str(" ORDER BY g.row_id");
    (query, binds)
}

pub async fn fetch_records(pool: &PgPool, filter: &RecordFilter) -> anyhow::Result<Vec<GradeRecord>> {
    let (query, binds) = select_query(filter);
    let mut rows = sqlx::query(&query);
    for value in &binds {
        rows = rows.bind(value.as_str());
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let category: String = row.get("category");
        let category = match category.parse::<Category>() {
            Ok(category) => category,
            Err(err) => {
                warn!(error = %err, "Skipping stored grade row");
                continue;
            }
        };
        let score: Option<String> = row.get("score");
        let record = GradeRecord {
            student_name: row.get("student_name"),
            student_id: row.get("student_id"),
            grade_level: row.get("grade_level"),
            shift: row.get("shift"),
            period: row.get("period"),
            subject: row.get("subject"),
            category,
            score: normalize_score(score.as_deref()),
            teacher_name: row.get("teacher_name"),
            teacher_id: row.get("teacher_id"),
        };
        if filter.matches(&record) {
            records.push(record);
        }
    }

    Ok(records)
}

#[async_trait]
impl GradeRepository for PgGradeStore {
    async fn load_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<GradeRecord>> {
        fetch_records(&self.pool, filter).await
    }

    #[tracing::instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn append_or_update(&self, writes: &[GradeWrite]) -> anyhow::Result<WriteSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = WriteSummary::default();

        for write in writes {
            match write {
                GradeWrite::Append(record) => {
                    insert_grade(
                        &mut tx,
                        &record.student_name,
                        &record.student_id,
                        &record.grade_level,
                        &record.shift,
                        &record.period,
                        &record.subject,
                        record.category,
                        &format!("{:.2}", record.score),
                        &record.teacher_name,
                        &record.teacher_id,
                    )
                    .await?;
                    summary.appended += 1;
                }
                GradeWrite::UpdateScore {
                    student_id,
                    grade_level,
                    subject,
                    period,
                    category,
                    score,
                } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE gradebook.grades SET score = $1, updated_at = now()
                        WHERE row_id = (
                            SELECT row_id FROM gradebook.grades
                            WHERE upper(trim(student_id)) = $2
                              AND upper(trim(grade_level)) = $3
                              AND upper(trim(subject)) = $4
                              AND upper(trim(period)) = $5
                              AND category = $6
                            ORDER BY row_id
                            LIMIT 1
                        )
                        "#,
                    )
                    .bind(format!("{score:.2}"))
                    .bind(normalize_label(student_id))
                    .bind(normalize_label(grade_level))
                    .bind(normalize_label(subject))
                    .bind(normalize_label(period))
                    .bind(category.as_str())
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() > 0 {
                        summary.updated += 1;
                    } else {
                        warn!(%student_id, %subject, %period, "No row to update");
                    }
                }
            }
        }

        if summary.changed() {
            bump_version(&mut tx).await?;
        }
        tx.commit().await.context("failed to commit grade writes")?;
        Ok(summary)
    }

    async fn entry_windows(&self) -> anyhow::Result<Vec<EntryWindow>> {
        let rows = sqlx::query(
            "SELECT period, opens_on, closes_on FROM gradebook.entry_windows ORDER BY period",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EntryWindow {
                period: row.get("period"),
                opens_on: row.get("opens_on"),
                closes_on: row.get("closes_on"),
            })
            .collect())
    }

    async fn set_entry_window(&self, window: &EntryWindow) -> anyhow::Result<()> {
        upsert_window(&self.pool, window).await
    }

    async fn store_version(&self) -> anyhow::Result<u64> {
        let version: i64 = sqlx::query("SELECT version FROM gradebook.store_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?
            .get("version");
        Ok(version as u64)
    }
}
