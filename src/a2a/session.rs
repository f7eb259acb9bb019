use serde_json::{Map, Value};
use warp::http::HeaderMap;

const MAX_LEN: usize = 128;

const USER_KEYS: &[&str] = &["user_id", "userId", "user", "telex_user_id"];
const ORG_KEYS: &[&str] = &[
    "org_id",
    "orgId",
    "organization_id",
    "workspace_id",
    "team_id",
    "installation_id",
    "telex_org_id",
];

/// Identity hints supplied in the request body.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionHints<'a> {
    pub user_id: Option<&'a str>,
    pub org_id: Option<&'a str>,
    pub channel_id: Option<&'a str>,
    pub metadata: Option<&'a Map<String, Value>>,
}

fn norm(s: Option<&str>) -> String {
    s.unwrap_or_default()
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .take(MAX_LEN)
        .collect()
}

/// Case-insensitive metadata lookup; only strings and integers count.
fn pick(meta: Option<&Map<String, Value>>, keys: &[&str]) -> Option<String> {
    let meta = meta?;
    keys.iter().find_map(|key| {
        meta.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                _ => None,
            })
    })
}

fn header<'h>(headers: &'h HeaderMap, names: &[&str]) -> Option<&'h str> {
    names
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
        })
}

fn first_non_empty(candidates: impl IntoIterator<Item = String>) -> String {
    candidates.into_iter().find(|c| !c.is_empty()).unwrap_or_default()
}

/// Stable conversation key: `org:user` when both are known, otherwise the
/// most specific identifier available, else `anonymous`.
pub fn session_id(hints: &SessionHints<'_>, headers: &HeaderMap) -> String {
    let user = first_non_empty([
        norm(hints.user_id),
        norm(pick(hints.metadata, USER_KEYS).as_deref()),
        norm(header(headers, &["x-user-id", "x-telex-user-id"])),
    ]);
    let org = first_non_empty([
        norm(hints.org_id),
        norm(pick(hints.metadata, ORG_KEYS).as_deref()),
        norm(header(headers, &["x-org-id", "x-telex-org-id", "x-workspace-id"])),
    ]);

    if !org.is_empty() && !user.is_empty() {
        return format!("{org}:{user}");
    }

    let fallback = first_non_empty([
        user,
        org,
        norm(header(headers, &["x-session-id"])),
        norm(hints.channel_id),
    ]);
    if fallback.is_empty() {
        "anonymous".to_string()
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warp::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn org_and_user_combine() {
        let hints = SessionHints {
            user_id: Some(" Ada Lovelace "),
            org_id: Some("ACME"),
            ..Default::default()
        };
        assert_eq!(session_id(&hints, &HeaderMap::new()), "acme:ada_lovelace");
    }

    #[test]
    fn metadata_then_headers_fill_gaps() {
        let meta = json!({"UserId": 42, "team_id": "Core"});
        let meta = meta.as_object().unwrap();
        let hints = SessionHints {
            metadata: Some(meta),
            ..Default::default()
        };
        assert_eq!(session_id(&hints, &HeaderMap::new()), "core:42");

        let hdrs = headers(&[("x-telex-user-id", "u-1"), ("x-workspace-id", "w-9")]);
        assert_eq!(session_id(&SessionHints::default(), &hdrs), "w-9:u-1");
    }

    #[test]
    fn non_scalar_metadata_is_ignored() {
        let meta = json!({"user": {"id": 1}, "org_id": true});
        let hints = SessionHints {
            metadata: meta.as_object(),
            channel_id: Some("General"),
            ..Default::default()
        };
        assert_eq!(session_id(&hints, &HeaderMap::new()), "general");
    }

    #[test]
    fn single_identifiers_and_anonymous() {
        let hints = SessionHints {
            user_id: Some("solo"),
            ..Default::default()
        };
        assert_eq!(session_id(&hints, &HeaderMap::new()), "solo");

        let hdrs = headers(&[("x-session-id", "S-77")]);
        assert_eq!(session_id(&SessionHints::default(), &hdrs), "s-77");
        assert_eq!(session_id(&SessionHints::default(), &HeaderMap::new()), "anonymous");
    }

    #[test]
    fn ids_are_truncated() {
        let long = "x".repeat(300);
        let hints = SessionHints {
            user_id: Some(&long),
            ..Default::default()
        };
        assert_eq!(session_id(&hints, &HeaderMap::new()).len(), MAX_LEN);
    }
}
