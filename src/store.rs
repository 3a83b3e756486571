//! Persistence for questionnaires and their answers.
//!
//! Every query is scoped by questionnaire id, and questionnaires carry the
//! owning user id; callers verify ownership before acting on another user's
//! records. Accounts and sessions are out of scope; the user id is an
//! opaque string.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{AnswerRow, QuestionnaireRecord, QuestionnaireStatus};

pub async fn insert_questionnaire(
    pool: &SqlitePool,
    user_id: &str,
    filename: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO questionnaires (id, user_id, filename, uploaded_at, status) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(filename)
    .bind(now)
    .bind(QuestionnaireStatus::Uploaded.as_str())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn set_questionnaire_status(
    pool: &SqlitePool,
    questionnaire_id: &str,
    status: QuestionnaireStatus,
) -> Result<()> {
    sqlx::query("UPDATE questionnaires SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(questionnaire_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_questionnaire(
    pool: &SqlitePool,
    questionnaire_id: &str,
) -> Result<Option<QuestionnaireRecord>> {
    let row = sqlx::query(
        "SELECT id, user_id, filename, uploaded_at, status FROM questionnaires WHERE id = ?",
    )
    .bind(questionnaire_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| QuestionnaireRecord {
        id: r.get("id"),
        user_id: r.get("user_id"),
        filename: r.get("filename"),
        uploaded_at: r.get("uploaded_at"),
        status: r.get("status"),
    }))
}

pub async fn list_questionnaires(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<QuestionnaireRecord>> {
    let rows = sqlx::query(
        "SELECT id, user_id, filename, uploaded_at, status \
         FROM questionnaires WHERE user_id = ? ORDER BY uploaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| QuestionnaireRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            filename: r.get("filename"),
            uploaded_at: r.get("uploaded_at"),
            status: r.get("status"),
        })
        .collect())
}

/// Replace all answers for a questionnaire in one transaction.
pub async fn replace_answers(
    pool: &SqlitePool,
    questionnaire_id: &str,
    rows: &[AnswerRow],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM answers WHERE questionnaire_id = ?")
        .bind(questionnaire_id)
        .execute(&mut *tx)
        .await?;

    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO answers
                (id, questionnaire_id, question_number, question_text, generated_answer,
                 edited_answer, citation, confidence, snippet, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.questionnaire_id)
        .bind(row.question_number)
        .bind(&row.question_text)
        .bind(&row.generated_answer)
        .bind(&row.edited_answer)
        .bind(&row.citation)
        .bind(row.confidence)
        .bind(&row.snippet)
        .bind(&row.status)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_answers(pool: &SqlitePool, questionnaire_id: &str) -> Result<Vec<AnswerRow>> {
    let rows = sqlx::query(
        "SELECT id, questionnaire_id, question_number, question_text, generated_answer, \
                edited_answer, citation, confidence, snippet, status \
         FROM answers WHERE questionnaire_id = ? ORDER BY question_number",
    )
    .bind(questionnaire_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| AnswerRow {
            id: r.get("id"),
            questionnaire_id: r.get("questionnaire_id"),
            question_number: r.get("question_number"),
            question_text: r.get("question_text"),
            generated_answer: r.get("generated_answer"),
            edited_answer: r.get("edited_answer"),
            citation: r.get("citation"),
            confidence: r.get("confidence"),
            snippet: r.get("snippet"),
            status: r.get("status"),
        })
        .collect())
}

/// Record a user edit, scoped to the user's own questionnaires. Returns
/// whether a matching answer existed.
pub async fn set_edited_answer(
    pool: &SqlitePool,
    user_id: &str,
    answer_id: &str,
    text: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE answers SET edited_answer = ? \
         WHERE id = ? AND questionnaire_id IN \
               (SELECT id FROM questionnaires WHERE user_id = ?)",
    )
    .bind(text)
    .bind(answer_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
