use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{Question, Quiz};
use crate::repositories;

/// Read-only view of quizzes and their questions, owned by the authoring side.
#[async_trait]
pub(crate) trait QuestionCatalog: Send + Sync {
    /// Live (not soft-deleted) quiz within the organization.
    async fn find_quiz(
        &self,
        organization_id: &str,
        quiz_id: &str,
    ) -> Result<Option<Quiz>, sqlx::Error>;

    /// Live questions of the quiz, in display order.
    async fn questions_for_quiz(
        &self,
        organization_id: &str,
        quiz_id: &str,
    ) -> Result<Vec<Question>, sqlx::Error>;

    async fn question_belongs_to_quiz(
        &self,
        question_id: &str,
        quiz_id: &str,
    ) -> Result<bool, sqlx::Error>;

    /// Any question of the organization, soft-deleted ones included.
    async fn find_question(
        &self,
        organization_id: &str,
        question_id: &str,
    ) -> Result<Option<Question>, sqlx::Error>;
}

pub(crate) struct PgQuestionCatalog {
    pool: PgPool,
}

impl PgQuestionCatalog {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionCatalog for PgQuestionCatalog {
    async fn find_quiz(
        &self,
        organization_id: &str,
        quiz_id: &str,
    ) -> Result<Option<Quiz>, sqlx::Error> {
        repositories::quizzes::find_live(&self.pool, organization_id, quiz_id).await
    }

    async fn questions_for_quiz(
        &self,
        organization_id: &str,
        quiz_id: &str,
    ) -> Result<Vec<Question>, sqlx::Error> {
        repositories::questions::list_live_by_quiz(&self.pool, organization_id, quiz_id).await
    }

    async fn question_belongs_to_quiz(
        &self,
        question_id: &str,
        quiz_id: &str,
    ) -> Result<bool, sqlx::Error> {
        repositories::questions::belongs_to_quiz(&self.pool, question_id, quiz_id).await
    }

    async fn find_question(
        &self,
        organization_id: &str,
        question_id: &str,
    ) -> Result<Option<Question>, sqlx::Error> {
        repositories::questions::find_by_id(&self.pool, organization_id, question_id).await
    }
}
