//! Authentication-method records from the initialize response.
//!
//! Agents advertise heterogeneous auth method records; classification maps
//! them onto the {agent, terminal} taxonomy. Raw JSON is inspected directly
//! (rather than a typed protocol model) so vendor `_meta` extension fields
//! survive untouched.

use serde_json::Value;
use std::fmt;

/// Normalized auth method type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethodKind {
    Agent,
    Terminal,
    /// An explicit `type` value outside the known taxonomy.
    Other(String),
}

impl fmt::Display for AuthMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethodKind::Agent => f.write_str("agent"),
            AuthMethodKind::Terminal => f.write_str("terminal"),
            AuthMethodKind::Other(name) => f.write_str(name),
        }
    }
}

impl AuthMethodKind {
    fn from_type_field(value: &str) -> Self {
        match value {
            "agent" => AuthMethodKind::Agent,
            "terminal" => AuthMethodKind::Terminal,
            other => AuthMethodKind::Other(other.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, AuthMethodKind::Agent | AuthMethodKind::Terminal)
    }
}

/// One advertised authentication method.
#[derive(Debug, Clone)]
pub struct AuthMethod {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: AuthMethodKind,
}

/// Parse the raw `authMethods` array from an initialize response.
///
/// Type detection priority per record:
/// 1. an explicit `type` field;
/// 2. `_meta` sidecar keys: `terminal-auth` ⇒ terminal, `agent-auth` ⇒ agent;
/// 3. default to `agent`.
pub fn parse_auth_methods(raw: &[Value]) -> Vec<AuthMethod> {
    raw.iter().map(parse_auth_method).collect()
}

fn parse_auth_method(record: &Value) -> AuthMethod {
    let kind = record
        .get("type")
        .and_then(Value::as_str)
        .map(AuthMethodKind::from_type_field)
        .or_else(|| kind_from_meta(record))
        .unwrap_or(AuthMethodKind::Agent);

    AuthMethod {
        id: string_field(record, "id"),
        name: string_field(record, "name"),
        description: record
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind,
    }
}

fn kind_from_meta(record: &Value) -> Option<AuthMethodKind> {
    let meta = record.get("_meta")?.as_object()?;
    if meta.contains_key("terminal-auth") {
        Some(AuthMethodKind::Terminal)
    } else if meta.contains_key("agent-auth") {
        Some(AuthMethodKind::Agent)
    } else {
        None
    }
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Validate that at least one method classifies as agent or terminal.
///
/// Returns the pass message, or the failure message naming the types that
/// were actually found.
pub fn validate_auth_methods(methods: &[AuthMethod]) -> Result<String, String> {
    if methods.is_empty() {
        return Err("No authMethods in response".to_string());
    }

    let valid = methods.iter().filter(|m| m.kind.is_valid()).count();
    if valid == 0 {
        let found: Vec<String> = methods.iter().map(|m| m.kind.to_string()).collect();
        return Err(format!(
            "No auth method with type 'agent' or 'terminal'. Found types: [{}]",
            found.join(", ")
        ));
    }

    Ok(format!("Found {valid} valid auth method(s)"))
}

/// Short per-method summary for the pass message, e.g. `oauth(agent)`.
pub fn describe_methods(methods: &[AuthMethod]) -> String {
    methods
        .iter()
        .map(|m| format!("{}({})", m.id, m.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_without_type_or_meta_default_to_agent() {
        let methods = parse_auth_methods(&[json!({"id": "oauth", "name": "OAuth"})]);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].kind, AuthMethodKind::Agent);
        assert_eq!(methods[0].id, "oauth");
    }

    #[test]
    fn explicit_type_beats_meta_keys() {
        let methods = parse_auth_methods(&[json!({
            "id": "login",
            "name": "Login",
            "type": "terminal",
            "_meta": {"agent-auth": {}}
        })]);
        assert_eq!(methods[0].kind, AuthMethodKind::Terminal);
    }

    #[test]
    fn meta_terminal_auth_key_classifies_terminal() {
        let methods = parse_auth_methods(&[json!({
            "id": "login",
            "name": "Login",
            "_meta": {"terminal-auth": {"command": "agent login"}}
        })]);
        assert_eq!(methods[0].kind, AuthMethodKind::Terminal);
    }

    #[test]
    fn meta_agent_auth_key_classifies_agent() {
        let methods = parse_auth_methods(&[json!({
            "id": "api-key",
            "name": "API key",
            "_meta": {"agent-auth": true}
        })]);
        assert_eq!(methods[0].kind, AuthMethodKind::Agent);
    }

    #[test]
    fn unknown_explicit_types_are_preserved_not_coerced() {
        let methods = parse_auth_methods(&[json!({
            "id": "x",
            "name": "X",
            "type": "browser-redirect"
        })]);
        assert_eq!(
            methods[0].kind,
            AuthMethodKind::Other("browser-redirect".to_string())
        );
    }

    #[test]
    fn zero_methods_fail_validation_citing_emptiness() {
        let err = validate_auth_methods(&[]).expect_err("must fail");
        assert_eq!(err, "No authMethods in response");
    }

    #[test]
    fn only_unknown_types_fail_naming_what_was_found() {
        let methods = parse_auth_methods(&[json!({
            "id": "x",
            "name": "X",
            "type": "browser-redirect"
        })]);
        let err = validate_auth_methods(&methods).expect_err("must fail");
        assert!(err.contains("browser-redirect"));
    }

    #[test]
    fn a_single_defaulted_agent_method_passes_validation() {
        let methods = parse_auth_methods(&[json!({"id": "oauth", "name": "OAuth"})]);
        let message = validate_auth_methods(&methods).expect("valid");
        assert_eq!(message, "Found 1 valid auth method(s)");
    }

    #[test]
    fn method_summaries_pair_id_with_kind() {
        let methods = parse_auth_methods(&[
            json!({"id": "oauth", "name": "OAuth"}),
            json!({"id": "login", "name": "Login", "type": "terminal"}),
        ]);
        assert_eq!(describe_methods(&methods), "oauth(agent), login(terminal)");
    }
}
