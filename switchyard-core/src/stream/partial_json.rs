//! Tolerant parsing of truncated JSON objects
//!
//! Tool-call arguments arrive as string fragments. After every fragment the
//! accumulated prefix is parsed into a best-effort object so consumers can
//! render arguments while they stream.

use serde_json::{Map, Value};

/// Parse a possibly-truncated JSON object
///
/// Complete input parses normally. Truncated input is closed (open string,
/// open arrays and objects) and, when that is not enough, cut back to the
/// last complete member. Anything that still fails yields an empty map.
pub fn parse_partial_json(input: &str) -> Map<String, Value> {
    let input = input.trim();
    if input.is_empty() {
        return Map::new();
    }
    if let Ok(Value::Object(map)) = serde_json::from_str(input) {
        return map;
    }

    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut cut_points: Vec<(usize, Vec<char>)> = Vec::new();

    for (i, c) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                open.push('}');
                cut_points.push((i + 1, open.clone()));
            }
            '[' => {
                open.push(']');
                cut_points.push((i + 1, open.clone()));
            }
            '}' | ']' => {
                open.pop();
                cut_points.push((i + 1, open.clone()));
            }
            ',' => cut_points.push((i, open.clone())),
            _ => {}
        }
    }

    let mut closed = input.to_string();
    if in_string {
        if escaped {
            closed.pop();
        }
        closed.push('"');
    }
    if let Some(map) = close_and_parse(&closed, &open) {
        return map;
    }

    cut_points
        .iter()
        .rev()
        .find_map(|(end, open)| close_and_parse(&input[..*end], open))
        .unwrap_or_default()
}

fn close_and_parse(prefix: &str, open: &[char]) -> Option<Map<String, Value>> {
    let mut candidate = prefix.trim_end().to_string();
    candidate.extend(open.iter().rev());
    match serde_json::from_str(&candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
