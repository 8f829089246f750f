//! Structured-record rendering.
//!
//! Business data arrives as JSON object graphs and must be rendered to
//! descriptive text before it can be embedded. Each known record type
//! has a bespoke template; anything else falls back to a generic
//! key-value rendering.

use serde_json::Value;

/// Render a structured record to searchable text.
pub fn render_record(data: &Value, data_type: &str) -> String {
    match data_type {
        "business_metrics" => format_business_metrics(data),
        "user_analytics" => format_user_analytics(data),
        "gaming_data" => format_gaming_data(data),
        _ => format_generic(data, data_type),
    }
}

fn format_business_metrics(data: &Value) -> String {
    let mut parts = vec!["Business Metrics Report:".to_string()];
    if let Value::Object(map) = data {
        for (metric, value) in map {
            push_entry(&mut parts, metric, value, 0);
        }
    }
    parts.join("\n")
}

fn format_user_analytics(data: &Value) -> String {
    let mut parts = vec!["User Analytics Data:".to_string()];

    if let Some(Value::Object(metrics)) = data.get("engagement_metrics") {
        parts.push("Engagement Metrics:".to_string());
        for (metric, value) in metrics {
            parts.push(format!("  - {}: {}", title_case(metric), render_scalar(value)));
        }
    }

    if let Some(Value::Array(patterns)) = data.get("behavior_patterns") {
        parts.push("Behavior Patterns:".to_string());
        for pattern in patterns {
            parts.push(format!("  - {}", render_scalar(pattern)));
        }
    }

    if let Some(Value::Object(demographics)) = data.get("user_demographics") {
        parts.push("User Demographics:".to_string());
        for (segment, value) in demographics {
            push_entry(&mut parts, segment, value, 1);
        }
    }

    parts.join("\n")
}

fn format_gaming_data(data: &Value) -> String {
    let mut parts = vec!["Gaming Data Analysis:".to_string()];

    if let Some(Value::Object(games)) = data.get("game_performance") {
        parts.push("Game Performance:".to_string());
        for (game, metrics) in games {
            parts.push(format!("  {}:", game));
            if let Value::Object(metric_map) = metrics {
                for (metric, value) in metric_map {
                    parts.push(format!(
                        "    - {}: {}",
                        title_case(metric),
                        render_scalar(value)
                    ));
                }
            }
        }
    }

    // Strategic sections share the generic nested layout.
    for (key, value) in data.as_object().into_iter().flatten() {
        if key == "game_performance" {
            continue;
        }
        push_entry(&mut parts, key, value, 0);
    }

    parts.join("\n")
}

fn format_generic(data: &Value, data_type: &str) -> String {
    let mut parts = vec![format!("{} Data:", title_case(data_type))];
    if let Value::Object(map) = data {
        for (key, value) in map {
            push_entry(&mut parts, key, value, 0);
        }
    } else {
        parts.push(render_scalar(data));
    }
    parts.join("\n")
}

/// Render one key with nested objects indented one level per depth.
fn push_entry(parts: &mut Vec<String>, key: &str, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            parts.push(format!("{}- {}:", indent, title_case(key)));
            for (sub_key, sub_value) in map {
                push_entry(parts, sub_key, sub_value, depth + 1);
            }
        }
        Value::Array(items) => {
            parts.push(format!("{}- {}:", indent, title_case(key)));
            for item in items {
                parts.push(format!("{}  - {}", indent, render_scalar(item)));
            }
        }
        _ => parts.push(format!(
            "{}- {}: {}",
            indent,
            title_case(key),
            render_scalar(value)
        )),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
