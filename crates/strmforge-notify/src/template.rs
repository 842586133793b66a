//! Message rendering with `{{.Var}}` placeholders.
//!
//! The placeholder dialect matches the payload contract consumed by
//! existing channel templates, so operators can carry their templates over
//! unchanged.

use serde_json::{Map, Value};

/// Default body for `task_completed` deliveries.
pub const DEFAULT_TASK_COMPLETED: &str = "Task {{.TaskName}} completed in {{.Duration}}s\n\
Source: {{.SourcePath}}\n\
Target: {{.TargetPath}}\n\
Total: {{.TotalFile}} | Generated: {{.GeneratedFile}} | Skipped: {{.SkipFile}} | \
Failed: {{.FailedCount}}";

/// Default body for `task_failed` deliveries.
pub const DEFAULT_TASK_FAILED: &str = "Task {{.TaskName}} failed after {{.Duration}}s\n\
Source: {{.SourcePath}}\n\
Error: {{.ErrorMessage}}";

/// Default body for `file_invalid` deliveries.
pub const DEFAULT_FILE_INVALID: &str = "Pointer validation found {{.InvalidFiles}} invalid \
of {{.TotalFiles}} checked\nMain reason: {{.MainReason}}";

/// Render `template`, substituting every `{{.Key}}` placeholder from the
/// payload map. Missing keys render as the empty string; strings render
/// unquoted, other values through their JSON form.
#[must_use]
pub fn render(template: &str, payload: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{.") {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 3..];
        match after_open.find("}}") {
            Some(close) => {
                let key = &after_open[..close];
                rendered.push_str(&render_value(payload.get(key.trim())));
                rest = &after_open[close + 2..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Pick the default template for one event kind.
#[must_use]
pub const fn default_template(event: strmforge_core::NotificationEvent) -> &'static str {
    match event {
        strmforge_core::NotificationEvent::TaskCompleted => DEFAULT_TASK_COMPLETED,
        strmforge_core::NotificationEvent::TaskFailed => DEFAULT_TASK_FAILED,
        strmforge_core::NotificationEvent::FileInvalid => DEFAULT_FILE_INVALID,
    }
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn placeholders_substitute_strings_and_numbers() {
        let payload = payload(&[
            ("TaskName", json!("movies")),
            ("Duration", json!(12)),
            ("SkipFile", json!(0)),
        ]);
        let rendered = render(
            "{{.TaskName}} took {{.Duration}}s, skipped {{.SkipFile}}",
            &payload,
        );
        assert_eq!(rendered, "movies took 12s, skipped 0");
    }

    #[test]
    fn missing_keys_render_empty() {
        let rendered = render("[{{.Missing}}]", &Map::new());
        assert_eq!(rendered, "[]");
    }

    #[test]
    fn unterminated_placeholders_pass_through() {
        let rendered = render("tail {{.Broken", &Map::new());
        assert_eq!(rendered, "tail {{.Broken");
    }

    #[test]
    fn default_templates_cover_their_variables() {
        let payload = payload(&[
            ("TaskName", json!("movies")),
            ("Duration", json!(3)),
            ("SourcePath", json!("/movies")),
            ("TargetPath", json!("/library/movies")),
            ("TotalFile", json!(3)),
            ("GeneratedFile", json!(3)),
            ("SkipFile", json!(0)),
            ("FailedCount", json!(0)),
        ]);
        let rendered = render(DEFAULT_TASK_COMPLETED, &payload);
        assert!(rendered.contains("movies"));
        assert!(rendered.contains("Generated: 3"));
        assert!(!rendered.contains("{{."), "no placeholder survives");
    }
}
