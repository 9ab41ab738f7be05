use serde::{Deserialize, Serialize};

/// Container id the sensor reports for syscalls that did not originate in a
/// monitored container. Lines scoped to it are never forwarded.
pub const HOST_CONTAINER_ID: &str = "host";

/// One rule-violation record tied to a monitored container, as forwarded to
/// the event store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorEvent {
    pub container_id: String,
    /// Image repository, with `:tag` appended when the sensor reported one.
    pub image_name: String,
    pub output: String,
    pub priority: String,
    pub rule: String,
    /// Timestamp exactly as emitted by the sensor.
    pub time: String,
}

/// Parse one line of the sensor's JSON output file.
///
/// Returns `None` for host-scoped records and for anything malformed or
/// incomplete. Partial lines are expected while the sensor is still flushing,
/// so an absent field is a skip, not an error.
pub fn parse_line(line: &str) -> Option<SensorEvent> {
    let record: serde_json::Value = serde_json::from_str(line).ok()?;
    let fields = record.get("output_fields")?;

    let container_id = fields.get("container.id")?.as_str()?;
    if container_id == HOST_CONTAINER_ID {
        return None;
    }

    let mut image_name = fields
        .get("container.image.repository")?
        .as_str()?
        .to_string();
    if let Some(tag) = fields.get("container.image.tag").and_then(|t| t.as_str()) {
        image_name.push(':');
        image_name.push_str(tag);
    }

    Some(SensorEvent {
        container_id: container_id.to_string(),
        image_name,
        output: record.get("output")?.as_str()?.to_string(),
        priority: record.get("priority")?.as_str()?.to_string(),
        rule: record.get("rule")?.as_str()?.to_string(),
        time: record.get("time")?.as_str()?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const WELL_FORMED: &str = r#"{"output_fields":{"container.id":"abc","container.image.repository":"nginx","container.image.tag":"1.21"},"output":"X","priority":"WARNING","rule":"R1","time":"t1"}"#;

    #[test]
    fn test_well_formed_record_populates_all_fields() {
        let event = parse_line(WELL_FORMED).expect("Expected an event");
        assert_eq!(event.container_id, "abc");
        assert_eq!(event.image_name, "nginx:1.21");
        assert_eq!(event.output, "X");
        assert_eq!(event.priority, "WARNING");
        assert_eq!(event.rule, "R1");
        assert_eq!(event.time, "t1");
    }

    #[test]
    fn test_tag_appended_only_when_present() {
        let no_tag = r#"{"output_fields":{"container.id":"abc","container.image.repository":"nginx"},"output":"X","priority":"WARNING","rule":"R1","time":"t1"}"#;
        let event = parse_line(no_tag).expect("Expected an event");
        assert_eq!(event.image_name, "nginx");
    }

    #[test]
    fn test_host_scoped_record_is_dropped() {
        let host = r#"{"output_fields":{"container.id":"host","container.image.repository":"nginx"},"output":"X","priority":"WARNING","rule":"R1","time":"t1"}"#;
        assert_eq!(parse_line(host), None);
    }

    #[test]
    fn test_missing_required_field_is_dropped() {
        // No "rule" field
        let incomplete = r#"{"output_fields":{"container.id":"abc","container.image.repository":"nginx"},"output":"X","priority":"WARNING","time":"t1"}"#;
        assert_eq!(parse_line(incomplete), None);
    }

    #[test]
    fn test_truncated_json_is_dropped() {
        let truncated = &WELL_FORMED[..WELL_FORMED.len() / 2];
        assert_eq!(parse_line(truncated), None);
    }

    #[test]
    fn test_wrong_field_types_are_dropped() {
        let numeric_id = r#"{"output_fields":{"container.id":42,"container.image.repository":"nginx"},"output":"X","priority":"WARNING","rule":"R1","time":"t1"}"#;
        assert_eq!(parse_line(numeric_id), None);
    }

    #[quickcheck]
    fn prop_arbitrary_input_never_panics(line: String) -> bool {
        let parsed = parse_line(&line);
        if serde_json::from_str::<serde_json::Value>(&line).is_err() {
            parsed.is_none()
        } else {
            true
        }
    }
}
