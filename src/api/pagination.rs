use serde::Serialize;

pub(crate) const MAX_LIMIT: i64 = 1000;

pub(crate) const fn default_limit() -> i64 {
    100
}

/// Clamps caller-supplied paging into `skip >= 0` and `1..=MAX_LIMIT`.
pub(crate) fn normalize(skip: i64, limit: i64) -> (i64, i64) {
    (skip.max(0), limit.clamp(1, MAX_LIMIT))
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}
