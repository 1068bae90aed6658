/// Current time as Unix millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
