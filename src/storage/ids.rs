use chrono::{DateTime, Local, NaiveDateTime};

/// Timestamp pattern for zk_uids; file names are prefixed with it.
pub const ZK_UID_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Pattern of the `Date:` line.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generate a zk_uid from the current local time (second resolution).
///
/// Two notes created within the same second get the same zk_uid; nothing
/// here detects that.
pub fn generate_zk_uid() -> String {
    zk_uid_at(Local::now())
}

pub fn zk_uid_at(instant: DateTime<Local>) -> String {
    instant.format(ZK_UID_FORMAT).to_string()
}

pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn current_date() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// True when `s` is a complete, fixed-width zk_uid such as `20240131-094512`.
pub fn is_zk_uid(s: &str) -> bool {
    s.len() == 15 && NaiveDateTime::parse_from_str(s, ZK_UID_FORMAT).is_ok()
}
