use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("question {question_id} does not belong to quiz {quiz_id}")]
    Consistency { question_id: String, quiz_id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{context}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl AttemptError {
    /// Wraps a storage error with the operation that failed, for `map_err`.
    pub(crate) fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { context, source }
    }
}
