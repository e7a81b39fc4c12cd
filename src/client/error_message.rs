//! Best-effort extraction of a human message from an error response body.

use serde_json::Value;

pub(crate) fn fallback_message(status: u16) -> String {
    format!("Request failed with status {}", status)
}

/// Pick the first usable message from the common error body shapes:
/// `{"message": ".."}`, `{"detail": ".."}`, `{"detail": [{"msg": ".."}]}`,
/// `{"error": ".."}` and `{"error": {"message": ".."}}`.
pub(crate) fn extract_message(status: u16, body: Option<&Value>) -> String {
    body.and_then(message_from_value)
        .unwrap_or_else(|| fallback_message(status))
}

fn message_from_value(body: &Value) -> Option<String> {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(m) = body.get("message").and_then(non_empty) {
        return Some(m);
    }

    match body.get("detail") {
        Some(d @ Value::String(_)) => {
            if let Some(d) = non_empty(d) {
                return Some(d);
            }
        }
        Some(Value::Array(items)) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(non_empty))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        Some(obj @ Value::Object(_)) => {
            if let Some(m) = obj.get("message").and_then(non_empty) {
                return Some(m);
            }
        }
        _ => {}
    }

    match body.get("error") {
        Some(e @ Value::String(_)) => non_empty(e),
        Some(obj @ Value::Object(_)) => obj.get("message").and_then(non_empty),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_field() {
        let body = json!({"message": "Invite expired"});
        assert_eq!(extract_message(410, Some(&body)), "Invite expired");
    }

    #[test]
    fn test_detail_string_and_list() {
        let body = json!({"detail": "Not a candidate on this simulation"});
        assert_eq!(
            extract_message(403, Some(&body)),
            "Not a candidate on this simulation"
        );

        let body = json!({"detail": [{"msg": "field required"}, {"msg": "value too long"}]});
        assert_eq!(
            extract_message(422, Some(&body)),
            "field required; value too long"
        );
    }

    #[test]
    fn test_error_shapes() {
        assert_eq!(
            extract_message(500, Some(&json!({"error": "boom"}))),
            "boom"
        );
        assert_eq!(
            extract_message(500, Some(&json!({"error": {"message": "nested boom"}}))),
            "nested boom"
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(extract_message(502, None), "Request failed with status 502");
        assert_eq!(
            extract_message(400, Some(&json!({"message": "   "}))),
            "Request failed with status 400"
        );
        assert_eq!(
            extract_message(404, Some(&json!(["not", "an", "object"]))),
            "Request failed with status 404"
        );
    }
}
