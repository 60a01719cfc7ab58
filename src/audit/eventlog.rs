//! DV-030: Append-only JSONL verification event log.

use crate::core::types::{TimestampedEvent, VerificationEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_utc(secs)
}

fn format_utc(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("v-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

pub fn event_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append one event to `<state_dir>/events.jsonl`, creating the directory.
pub fn append_event(state_dir: &Path, event: VerificationEvent) -> Result<(), String> {
    std::fs::create_dir_all(state_dir)
        .map_err(|e| format!("cannot create state dir {}: {}", state_dir.display(), e))?;
    let path = event_log_path(state_dir);

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;
    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))
}

/// Read back every event in the log. Malformed lines are an error.
pub fn read_events(state_dir: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(state_dir);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("{} line {}: {}", path.display(), i + 1, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Sublanguage;

    #[test]
    fn test_dv030_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 20);
    }

    #[test]
    fn test_dv030_format_utc_known_instants() {
        assert_eq!(format_utc(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_utc(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(format_utc(1_709_251_199), "2024-02-29T23:59:59Z");
        assert_eq!(format_utc(4_107_542_400), "2100-03-01T00:00:00Z");
    }

    #[test]
    fn test_dv030_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("v-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_dv030_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        append_event(
            &state,
            VerificationEvent::ExecutionCompleted {
                run_id: "v-1".into(),
                side: Sublanguage::Query,
                duration_seconds: 0.01,
                rows: Some(3),
                diagnostic: None,
            },
        )
        .unwrap();
        append_event(
            &state,
            VerificationEvent::VerificationCompleted {
                run_id: "v-1".into(),
                outcome: "verified".into(),
                output_hash: Some("blake3:00".into()),
                total_seconds: 0.02,
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(state.join("events.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"execution_completed\""));

        let events = read_events(&state).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1].event,
            VerificationEvent::VerificationCompleted { .. }
        ));
    }

    #[test]
    fn test_dv030_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_events(dir.path()).unwrap_err();
        assert!(err.contains("cannot read"));
    }
}
