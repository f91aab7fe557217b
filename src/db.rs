use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::ingest::{self, MissingScorePolicy};
use crate::models::{RawGradeRow, Student};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    class_name: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grade_trends.students (id, full_name, email, class_name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, class_name = EXCLUDED.class_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(class_name)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_grade(
    pool: &PgPool,
    student_id: Uuid,
    subject: &str,
    component: &str,
    graded_on: NaiveDate,
    score: Option<&str>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO grade_trends.grades
        (id, student_id, subject, component, graded_on, score, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject)
    .bind(component)
    .bind(graded_on)
    .bind(score)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = [
        ("Avery Lee", "avery.lee@school.example", "XI-A"),
        ("Jules Moreno", "jules.moreno@school.example", "XI-A"),
        ("Kiara Patel", "kiara.patel@school.example", "XI-A"),
    ];

    // One entry per term, starting in the first term of 2023/2024.
    let grades: [(&str, &str, [f64; 4]); 6] = [
        ("avery.lee@school.example", "Mathematics", [78.0, 80.0, 83.0, 85.0]),
        ("avery.lee@school.example", "English", [74.0, 76.0, 75.0, 77.0]),
        ("jules.moreno@school.example", "Mathematics", [72.0, 70.0, 66.0, 48.0]),
        ("jules.moreno@school.example", "English", [58.0, 62.0, 56.0, 54.0]),
        ("kiara.patel@school.example", "Mathematics", [88.0, 61.0, 90.0, 64.0]),
        ("kiara.patel@school.example", "English", [81.0, 82.0, 80.0, 83.0]),
    ];
    let term_dates = [
        NaiveDate::from_ymd_opt(2023, 11, 20).context("invalid date")?,
        NaiveDate::from_ymd_opt(2024, 5, 13).context("invalid date")?,
        NaiveDate::from_ymd_opt(2024, 11, 18).context("invalid date")?,
        NaiveDate::from_ymd_opt(2025, 5, 12).context("invalid date")?,
    ];

    for (name, email, class_name) in students {
        upsert_student(pool, name, email, class_name).await?;
    }

    for (email, subject, scores) in grades {
        let student_id: Uuid =
            sqlx::query("SELECT id FROM grade_trends.students WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?
                .get("id");

        for (graded_on, score) in term_dates.iter().zip(scores) {
            let source_key = format!("seed-{email}-{subject}-{graded_on}");
            insert_grade(
                pool,
                student_id,
                subject,
                "term exam",
                *graded_on,
                Some(&score.to_string()),
                &source_key,
            )
            .await?;
        }
    }

    info!(students = students.len(), series = grades.len(), "seeded grade store");
    Ok(())
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> Student {
    Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        class_name: row.get("class_name"),
    }
}

pub async fn fetch_student_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query(
        "SELECT id, full_name, email, class_name FROM grade_trends.students WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(student_from_row))
}

pub async fn fetch_class_roster(pool: &PgPool, class_name: &str) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, email, class_name FROM grade_trends.students \
         WHERE class_name = $1 ORDER BY full_name",
    )
    .bind(class_name)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn fetch_grades(
    pool: &PgPool,
    student_ids: &[Uuid],
    subject: Option<&str>,
) -> anyhow::Result<Vec<RawGradeRow>> {
    let mut query = String::from(
        "SELECT g.student_id, s.full_name, g.subject, g.graded_on, g.score \
         FROM grade_trends.grades g \
         JOIN grade_trends.students s ON s.id = g.student_id \
         WHERE g.student_id = ANY($1)",
    );
    if subject.is_some() {
        query.push_str(" AND g.subject = $2");
    }
    query.push_str(" ORDER BY g.student_id, g.subject, g.graded_on");

    let mut rows = sqlx::query(&query).bind(student_ids);
    if let Some(value) = subject {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut grades = Vec::with_capacity(records.len());

    for row in records {
        grades.push(RawGradeRow {
            student_id: row.get("student_id"),
            student_name: row.get("full_name"),
            subject: row.get("subject"),
            graded_on: row.get("graded_on"),
            score: row.get("score"),
        });
    }

    Ok(grades)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    policy: MissingScorePolicy,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = ingest::read_import_rows(file, policy)?;
    let mut inserted = 0usize;

    for row in rows {
        let student_id = upsert_student(pool, &row.full_name, &row.email, &row.class_name).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_grade(
            pool,
            student_id,
            &row.subject,
            &row.component,
            row.graded_on,
            row.score.as_deref(),
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}
