pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod questions;
pub(crate) mod quizzes;
