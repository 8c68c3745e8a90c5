use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Timestamps are stored as `timestamp without time zone` holding UTC.
pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    to_primitive_utc(OffsetDateTime::now_utc())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    let utc = value.assume_utc();
    utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string())
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS` read as UTC.
pub(crate) fn parse_client_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
        PrimitiveDateTime::parse(
            raw,
            &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
        .ok()
        .map(PrimitiveDateTime::assume_utc)
    })
}
