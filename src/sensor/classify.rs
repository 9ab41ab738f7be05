//! Best-effort grouping of the sensor's process output into rule warnings.
//!
//! Falco prefixes its own log lines with the current weekday ("Tue 10:01:02
//! ..."), while the rules parser prints unprefixed "Rule ..." lines followed
//! by wrapped continuation text. The classifier merges each rule block into a
//! single warning for the operator and must never fail on unexpected shapes.

use chrono::Local;

const RULE_PREFIX: &str = "Rule ";

/// Group `logs` into one warning per rule block, using today's weekday
/// abbreviation to recognize the sensor's own timestamped lines.
pub fn classify(logs: &str) -> Vec<String> {
    let date_prefix = Local::now().format("%a ").to_string();
    classify_with_prefix(logs, &date_prefix)
}

fn classify_with_prefix(logs: &str, date_prefix: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut current: Option<String> = None;

    for line in logs.lines() {
        if line.starts_with(date_prefix) {
            // Sensor log line, not rule text
            continue;
        }
        let line = line.trim();
        if line.starts_with(RULE_PREFIX) {
            if let Some(warning) = current.take() {
                warnings.push(warning);
            }
            current = Some(line.to_string());
        } else if let Some(warning) = &mut current {
            if !line.is_empty() {
                warning.push(' ');
                warning.push_str(line);
            }
        }
    }
    if let Some(warning) = current {
        warnings.push(warning);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rule_lines_yields_no_warnings() {
        let logs = "Mon 10:00:00 Falco initialized with configuration\nMon 10:00:01 Loading rules from file\nsome stray line";
        assert!(classify_with_prefix(logs, "Mon ").is_empty());
    }

    #[test]
    fn test_two_rule_blocks_with_continuations() {
        let logs = "Rule Write below etc: warning\n  (used 3 times)\nRule Run shell in container: warning\n  (used 1 time)";
        let warnings = classify_with_prefix(logs, "Mon ");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], "Rule Write below etc: warning (used 3 times)");
        assert_eq!(
            warnings[1],
            "Rule Run shell in container: warning (used 1 time)"
        );
    }

    #[test]
    fn test_final_block_is_flushed_at_end_of_input() {
        let logs = "Rule Terminal shell in container: warning\n  appended condition";
        let warnings = classify_with_prefix(logs, "Mon ");
        assert_eq!(
            warnings,
            vec!["Rule Terminal shell in container: warning appended condition"]
        );
    }

    #[test]
    fn test_weekday_prefixed_lines_are_not_accumulated() {
        let logs = "Rule Write below etc: warning\nMon 10:00:02 Starting internal webserver\n  continuation text";
        let warnings = classify_with_prefix(logs, "Mon ");
        assert_eq!(warnings, vec!["Rule Write below etc: warning continuation text"]);
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(classify_with_prefix("", "Mon ").is_empty());
        assert!(classify_with_prefix("\n\n   \n", "Mon ").is_empty());
    }

    #[test]
    fn test_classify_uses_todays_prefix() {
        let today = Local::now().format("%a ").to_string();
        let logs = format!("{today}10:00:00 Loading rules\nRule R: warning");
        assert_eq!(classify(&logs), vec!["Rule R: warning"]);
    }
}
