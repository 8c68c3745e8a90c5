use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::catalog::{PgQuestionCatalog, QuestionCatalog};
use crate::services::grading::AnswerGrader;
use crate::services::submission::SubmissionCoordinator;
use crate::services::validation::{GradeValidator, SubmissionValidator};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    coordinator: SubmissionCoordinator,
    grader: AnswerGrader,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool) -> Self {
        let catalog: Arc<dyn QuestionCatalog> = Arc::new(PgQuestionCatalog::new(db.clone()));
        let grading = settings.grading();
        let coordinator = SubmissionCoordinator::new(
            catalog.clone(),
            SubmissionValidator::new(grading.max_answers_per_submission, grading.max_answer_length),
            grading.status_policy,
        );
        let grader = AnswerGrader::new(
            catalog,
            GradeValidator::new(grading.max_feedback_length),
            grading.eager_recompute,
        );

        Self { inner: Arc::new(InnerState { settings, db, coordinator, grader }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn coordinator(&self) -> &SubmissionCoordinator {
        &self.inner.coordinator
    }

    pub(crate) fn grader(&self) -> &AnswerGrader {
        &self.inner.grader
    }
}
