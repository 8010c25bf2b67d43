//! Output formatting for CLI responses.
//!
//! Supports both human-readable and JSON output formats for
//! integration with scripts and other tools.

use rddlock_coordination::LockState;
use rddlock_coordination::LockToken;

/// Trait for types that can be output in multiple formats.
pub trait Outputable {
    /// Convert to JSON value for structured output.
    fn to_json(&self) -> serde_json::Value;

    /// Convert to human-readable string.
    fn to_human(&self) -> String;
}

/// Print a value in the appropriate format.
pub fn print_output<T: Outputable>(value: &T, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&value.to_json())
                .unwrap_or_else(|e| { format!("{{\"error\": \"failed to serialize: {}\"}}", e) })
        );
    } else {
        println!("{}", value.to_human());
    }
}

/// Lock state output.
pub struct InspectOutput {
    pub key: String,
    pub state: LockState,
}

impl Outputable for InspectOutput {
    fn to_json(&self) -> serde_json::Value {
        let mut value = match &self.state {
            LockState::Absent => serde_json::json!({
                "key": self.key,
                "state": "absent"
            }),
            LockState::Held { token, remaining } => serde_json::json!({
                "key": self.key,
                "state": "held",
                "token": token.encode(),
                "expires_at_ns": token.expires_at_ns(),
                "remaining_ms": u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
            }),
            LockState::Expired { token } => serde_json::json!({
                "key": self.key,
                "state": "expired",
                "token": token.encode(),
                "expires_at_ns": token.expires_at_ns()
            }),
        };
        value["acquirable"] = serde_json::Value::Bool(self.state.is_acquirable());
        value
    }

    fn to_human(&self) -> String {
        let summary = match &self.state {
            LockState::Absent => format!("Lock '{}' is free.", self.key),
            LockState::Held { token, remaining } => format!(
                "Lock '{}' is held.\n\
                 Token:     {}\n\
                 Remaining: {} ms",
                self.key,
                token,
                remaining.as_millis()
            ),
            LockState::Expired { token } => format!(
                "Lock '{}' expired but is still present.\n\
                 Token:     {}",
                self.key, token
            ),
        };
        let availability = if self.state.is_acquirable() { "can be acquired" } else { "cannot be acquired now" };
        format!("{summary}\nAcquire:   {availability}")
    }
}

/// Lock operation output.
pub struct LockOutput {
    pub operation: String,
    pub key: String,
    pub success: bool,
    pub token: Option<LockToken>,
    pub error: Option<String>,
}

impl Outputable for LockOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "operation": self.operation,
            "key": self.key,
            "success": self.success,
            "token": self.token.map(|t| t.encode()),
            "expires_at_ns": self.token.map(|t| t.expires_at_ns()),
            "error": self.error
        })
    }

    fn to_human(&self) -> String {
        if self.success {
            match self.operation.as_str() {
                "acquire" => {
                    let token = self.token.map(|t| t.encode()).unwrap_or_else(|| "N/A".to_string());
                    format!("Lock acquired. Token: {}", token)
                }
                "release" => "Lock released.".to_string(),
                "force_release" | "safe_force_release" => "Lock deleted.".to_string(),
                _ => format!("{} succeeded", self.operation),
            }
        } else {
            match &self.error {
                Some(e) => format!("{} failed: {}", self.operation, e),
                None => format!("{} failed", self.operation),
            }
        }
    }
}
