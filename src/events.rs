//! Topic names for camera event publication.

/// Topic carrying notifications for `event` under `base`.
pub fn event_topic_name(base: &str, event: &str) -> String {
    format!("{base}/event_{event}")
}

/// Control topic used to subscribe to events under `base`.
pub fn subscribe_topic_name(base: &str) -> String {
    format!("{base}/_event_subscribe")
}

/// Control topic used to unsubscribe from events under `base`.
pub fn unsubscribe_topic_name(base: &str) -> String {
    format!("{base}/_event_unsubscribe")
}
