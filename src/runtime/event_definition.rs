//! Compiled event definitions.
//!
//! An event definition selects notifications by event type and lists the
//! traits to extract from them:
//!
//! ```yaml
//! - event_type: [compute.instance.*, "!compute.instance.exists"]
//!   traits:
//!     instance_id:
//!       fields: [payload.instance_uuid, payload.instance_id]
//!     host:
//!       fields: payload.host
//! ```
//!
//! Patterns are shell-style globs matched against the whole event type; a
//! leading `!` excludes. Every definition also extracts the default
//! `service`, `request_id` and `tenant_id` traits.

use chrono::{DateTime, Utc};
use glob::Pattern;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::condenser::Condenser;
use crate::datatype::to_datetime;
use crate::error::{ConversionError, DefinitionError, DistillError, Result};
use crate::plugin_registry::PluginRegistry;
use crate::runtime::trait_definition::TraitDefinition;

/// Source of the current time, used when a notification has no timestamp.
pub type Clock = fn() -> DateTime<Utc>;

const CATCHALL_PATTERN: &str = "*";

/// Traits every event definition extracts.
pub fn default_traits() -> Vec<(&'static str, Value)> {
    vec![
        ("service", json!({"type": "text", "fields": "publisher_id"})),
        ("request_id", json!({"type": "text", "fields": "_context_request_id"})),
        (
            "tenant_id",
            json!({"type": "text", "fields": ["payload.tenant_id", "_context_tenant"]}),
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct EventConfig {
    event_type: Option<EventTypes>,
    traits: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventTypes {
    One(String),
    Many(Vec<String>),
}

/// One event definition, ready to match and extract.
#[derive(Debug)]
pub struct EventDefinition {
    included_types: Vec<String>,
    excluded_types: Vec<String>,
    included_patterns: Vec<Pattern>,
    excluded_patterns: Vec<Pattern>,
    traits: IndexMap<String, TraitDefinition>,
}

impl EventDefinition {
    /// Compile an event definition from its configuration fragment.
    pub fn new(
        cfg: &Value,
        plugins: &PluginRegistry,
    ) -> std::result::Result<Self, DefinitionError> {
        let config: EventConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            DefinitionError::new(format!("unable to read event definition: {}", e), cfg)
        })?;

        let event_types = match config.event_type {
            Some(EventTypes::One(t)) => vec![t],
            Some(EventTypes::Many(ts)) => ts,
            None => {
                return Err(DefinitionError::new(
                    "required field event_type not specified",
                    cfg,
                ))
            }
        };
        let traits_cfg = config
            .traits
            .ok_or_else(|| DefinitionError::new("required field traits not specified", cfg))?;

        let mut included_types = Vec::new();
        let mut excluded_types = Vec::new();
        for t in event_types {
            match t.strip_prefix('!') {
                Some(excluded) => excluded_types.push(excluded.to_string()),
                None => included_types.push(t),
            }
        }
        if !excluded_types.is_empty() && included_types.is_empty() {
            included_types.push(CATCHALL_PATTERN.to_string());
        }

        let included_patterns = compile_patterns(&included_types, cfg)?;
        let excluded_patterns = compile_patterns(&excluded_types, cfg)?;

        let mut traits = IndexMap::new();
        for (name, trait_cfg) in default_traits() {
            traits.insert(name.to_string(), TraitDefinition::new(name, &trait_cfg, plugins)?);
        }
        for (name, trait_cfg) in &traits_cfg {
            traits.insert(name.clone(), TraitDefinition::new(name, trait_cfg, plugins)?);
        }

        debug!(
            included = ?included_types,
            excluded = ?excluded_types,
            traits = traits.len(),
            "compiled event definition"
        );

        Ok(Self {
            included_types,
            excluded_types,
            included_patterns,
            excluded_patterns,
            traits,
        })
    }

    /// Definition matching every event type with only the default traits.
    pub fn catchall(plugins: &PluginRegistry) -> std::result::Result<Self, DefinitionError> {
        Self::new(&json!({"event_type": CATCHALL_PATTERN, "traits": {}}), plugins)
    }

    pub fn included_types(&self) -> &[String] {
        &self.included_types
    }

    pub fn excluded_types(&self) -> &[String] {
        &self.excluded_types
    }

    pub fn traits(&self) -> &IndexMap<String, TraitDefinition> {
        &self.traits
    }

    pub fn included_type(&self, event_type: &str) -> bool {
        self.included_patterns.iter().any(|p| p.matches(event_type))
    }

    pub fn excluded_type(&self, event_type: &str) -> bool {
        self.excluded_patterns.iter().any(|p| p.matches(event_type))
    }

    /// Whether notifications of this event type are described by this definition.
    pub fn match_type(&self, event_type: &str) -> bool {
        self.included_type(event_type) && !self.excluded_type(event_type)
    }

    /// True when the definition includes `*` and excludes nothing.
    pub fn is_catchall(&self) -> bool {
        self.included_types.iter().any(|t| t == CATCHALL_PATTERN) && self.excluded_types.is_empty()
    }

    /// Timestamp of a notification.
    ///
    /// Uses `timestamp`, falling back to `_context_timestamp` when that is
    /// missing or empty, and to `now` when neither is usable.
    pub fn extract_when(
        body: &Value,
        now: impl FnOnce() -> DateTime<Utc>,
    ) -> std::result::Result<DateTime<Utc>, ConversionError> {
        let when = ["timestamp", "_context_timestamp"]
            .iter()
            .filter_map(|key| body.get(key))
            .find(|value| is_truthy(value));

        match when {
            Some(value) => to_datetime(value),
            None => Ok(now()),
        }
    }

    /// Extract envelope and traits from a notification into `condenser`.
    pub fn apply<'c, C: Condenser>(&self, body: &Value, condenser: &'c mut C) -> Result<&'c mut C> {
        self.apply_with_clock(body, condenser, Utc::now)
    }

    /// Like [`EventDefinition::apply`], with an explicit clock.
    pub fn apply_with_clock<'c, C: Condenser>(
        &self,
        body: &Value,
        condenser: &'c mut C,
        clock: Clock,
    ) -> Result<&'c mut C> {
        let event_type = envelope_field(body, "event_type")?;
        let message_id = envelope_field(body, "message_id")?;
        let when = Self::extract_when(body, clock).map_err(DistillError::Timestamp)?;

        condenser.add_envelope_info(&event_type, &message_id, when);
        for definition in self.traits.values() {
            let extracted = definition
                .to_trait(body)
                .map_err(|source| DistillError::Conversion {
                    name: definition.name().to_string(),
                    source,
                })?;
            if let Some(t) = extracted {
                condenser.add_trait(&t.name, t.datatype, t.value);
            }
        }
        Ok(condenser)
    }
}

fn compile_patterns(
    patterns: &[String],
    cfg: &Value,
) -> std::result::Result<Vec<Pattern>, DefinitionError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(&shell_pattern(p)).map_err(|e| {
                DefinitionError::new(format!("invalid event_type pattern '{}': {}", p, e), cfg)
            })
        })
        .collect()
}

/// Rewrite a shell-style pattern into `glob` syntax.
///
/// Runs of `*` collapse to one `*` (which already crosses `.` and `/` with
/// the default match options), and a `[` without a closing `]` is literal.
fn shell_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.extend(&chars[i..=end]);
                    i = end;
                }
                None => out.push_str(&Pattern::escape("[")),
            },
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the character class opened at `start`. A `]`
/// right after `[` or `[!` belongs to the class.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Read a required envelope field (`event_type`, `message_id`).
pub(crate) fn envelope_field(body: &Value, key: &str) -> Result<String> {
    match body.get(key) {
        None | Some(Value::Null) => Err(DistillError::missing(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
        Some(_) => Err(DistillError::MalformedRecord {
            reason: format!("field '{}' must be a scalar", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::TraitCondenser;
    use crate::datatype::{Datatype, TraitValue};
    use chrono::{Duration, TimeZone};

    fn traits_cfg() -> Value {
        json!({
            "instance_id": {
                "type": "text",
                "fields": ["payload.instance_uuid", "payload.instance_id"]
            },
            "host": {"type": "text", "fields": "payload.host"}
        })
    }

    fn notification(message_id: &str, payload: Value) -> Value {
        json!({
            "event_type": "test.thing",
            "message_id": message_id,
            "priority": "INFO",
            "publisher_id": "compute.host-1-2-3",
            "timestamp": "2013-08-08 21:06:37.803826",
            "payload": payload
        })
    }

    fn edef(event_type: Value) -> EventDefinition {
        let cfg = json!({"event_type": event_type, "traits": traits_cfg()});
        EventDefinition::new(&cfg, &PluginRegistry::new()).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_apply() {
        let body = notification(
            "uuid-for-notif-0001",
            json!({"instance_id": "uuid-for-instance-0001", "host": "host-1-2-3"}),
        );
        let def = edef(json!("test.thing"));
        let mut condenser = TraitCondenser::new();

        let e = def.apply(&body, &mut condenser).unwrap();

        assert_eq!(e.event_type.as_deref(), Some("test.thing"));
        assert_eq!(
            e.when,
            Some(
                Utc.with_ymd_and_hms(2013, 8, 8, 21, 6, 37).unwrap()
                    + Duration::microseconds(803826)
            )
        );
        let service = e.get_trait("service").unwrap();
        assert_eq!(service.datatype, Datatype::Text);
        assert_eq!(e.get_trait("host").unwrap().value, TraitValue::Text("host-1-2-3".to_string()));
        assert_eq!(
            e.get_trait("instance_id").unwrap().value,
            TraitValue::Text("uuid-for-instance-0001".to_string())
        );
    }

    #[test]
    fn test_apply_missing_or_null_trait() {
        let def = edef(json!("test.thing"));
        for payload in [
            json!({"instance_id": "uuid-for-instance-0002"}),
            json!({"instance_id": "uuid-for-instance-0003", "host": null}),
        ] {
            let mut condenser = TraitCondenser::new();
            def.apply(&notification("n", payload), &mut condenser).unwrap();

            assert!(condenser.has_trait("service"));
            assert!(condenser.has_trait("instance_id"));
            assert!(!condenser.has_trait("host"));
        }
    }

    #[test]
    fn test_apply_malformed_notification() {
        let def = edef(json!("test.thing"));
        let mut condenser = TraitCondenser::new();

        let no_id = json!({"event_type": "test.thing"});
        assert!(matches!(
            def.apply(&no_id, &mut condenser),
            Err(DistillError::MalformedRecord { .. })
        ));

        let no_type = json!({"message_id": "abc"});
        assert!(matches!(
            def.apply(&no_type, &mut condenser),
            Err(DistillError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_apply_conversion_error_names_trait() {
        let cfg = json!({
            "event_type": "*",
            "traits": {"size": {"type": "int", "fields": "payload.size"}}
        });
        let def = EventDefinition::new(&cfg, &PluginRegistry::new()).unwrap();
        let mut condenser = TraitCondenser::new();

        let err = def
            .apply(&notification("n", json!({"size": "huge"})), &mut condenser)
            .unwrap_err();
        assert!(matches!(err, DistillError::Conversion { ref name, .. } if name == "size"));
    }

    #[test]
    fn test_bogus_cfg() {
        let registry = PluginRegistry::new();
        assert!(EventDefinition::new(&json!({"event_type": "test.foo"}), &registry).is_err());
        assert!(EventDefinition::new(&json!({"traits": traits_cfg()}), &registry).is_err());
    }

    #[test]
    fn test_included_type_string() {
        let def = edef(json!("test.thing"));
        assert_eq!(def.included_types(), ["test.thing"]);
        assert!(def.excluded_types().is_empty());
        assert!(def.included_type("test.thing"));
        assert!(!def.excluded_type("test.thing"));
        assert!(def.match_type("test.thing"));
        assert!(!def.match_type("random.thing"));
    }

    #[test]
    fn test_included_type_list() {
        let def = edef(json!(["test.thing", "other.thing"]));
        assert_eq!(def.included_types().len(), 2);
        assert!(def.excluded_types().is_empty());
        assert!(def.match_type("test.thing"));
        assert!(def.match_type("other.thing"));
        assert!(!def.match_type("random.thing"));
    }

    #[test]
    fn test_excluded_type_string() {
        let def = edef(json!("!test.thing"));
        assert_eq!(def.included_types(), ["*"]);
        assert_eq!(def.excluded_types(), ["test.thing"]);
        assert!(def.excluded_type("test.thing"));
        assert!(def.included_type("random.thing"));
        assert!(!def.match_type("test.thing"));
        assert!(def.match_type("random.thing"));
    }

    #[test]
    fn test_excluded_type_list() {
        let def = edef(json!(["!test.thing", "!other.thing"]));
        assert_eq!(def.included_types().len(), 1);
        assert_eq!(def.excluded_types().len(), 2);
        assert!(!def.excluded_type("random.thing"));
        assert!(!def.match_type("test.thing"));
        assert!(!def.match_type("other.thing"));
        assert!(def.match_type("random.thing"));
    }

    #[test]
    fn test_mixed_type_list() {
        let def = edef(json!(["*.thing", "!test.thing", "!other.thing"]));
        assert_eq!(def.included_types().len(), 1);
        assert_eq!(def.excluded_types().len(), 2);
        assert!(!def.match_type("test.thing"));
        assert!(!def.match_type("other.thing"));
        assert!(!def.match_type("random.whatzit"));
        assert!(def.match_type("random.thing"));
    }

    #[test]
    fn test_glob_character_classes() {
        let def = edef(json!(["compute.instance.[cd]*", "!compute.instance.?ull"]));
        assert!(def.match_type("compute.instance.create.start"));
        assert!(def.match_type("compute.instance.delete.end"));
        assert!(!def.match_type("compute.instance.dull"));
        assert!(!def.match_type("compute.instance.update"));
    }

    #[test]
    fn test_repeated_stars_match_like_one() {
        let def = edef(json!("compute.**"));
        assert!(def.match_type("compute.instance.create.end"));
        assert!(!def.match_type("network.create"));

        let def = edef(json!("***"));
        assert!(def.match_type("anything.at.all"));

        let def = edef(json!(["compute.*.**.end", "!compute.***.exists.end"]));
        assert!(def.match_type("compute.instance.create.end"));
        assert!(!def.match_type("compute.instance.exists.end"));
        assert!(!def.match_type("compute.instance.create.start"));
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        let def = edef(json!("foo["));
        assert!(def.match_type("foo["));
        assert!(!def.match_type("foo"));
        assert!(!def.match_type("foox"));

        let def = edef(json!("a[b.*"));
        assert!(def.match_type("a[b.c"));
        assert!(!def.match_type("ab.c"));
    }

    #[test]
    fn test_shell_pattern() {
        assert_eq!(shell_pattern("compute.**"), "compute.*");
        assert_eq!(shell_pattern("a***b"), "a*b");
        assert_eq!(shell_pattern("foo["), "foo[[]");
        assert_eq!(shell_pattern("x.[cd]*"), "x.[cd]*");
        assert_eq!(shell_pattern("x.[!]a]"), "x.[!]a]");
    }

    #[test]
    fn test_catchall() {
        assert!(!edef(json!(["*.thing", "!test.thing", "!other.thing"])).is_catchall());
        assert!(!edef(json!(["!other.thing"])).is_catchall());
        assert!(!edef(json!(["other.thing"])).is_catchall());
        assert!(!edef(json!(["*", "!other.thing"])).is_catchall());
        assert!(edef(json!(["*"])).is_catchall());
        assert!(edef(json!(["*", "foo"])).is_catchall());
        assert!(EventDefinition::catchall(&PluginRegistry::new()).unwrap().is_catchall());
    }

    #[test]
    fn test_extract_when() {
        let now = fixed_now();
        let modified = now + Duration::minutes(1);
        let then = now + Duration::hours(1);

        let body = json!({"timestamp": modified.to_rfc3339()});
        assert_eq!(EventDefinition::extract_when(&body, fixed_now).unwrap(), modified);

        let body = json!({"_context_timestamp": modified.to_rfc3339()});
        assert_eq!(EventDefinition::extract_when(&body, fixed_now).unwrap(), modified);

        let body = json!({
            "timestamp": modified.to_rfc3339(),
            "_context_timestamp": then.to_rfc3339()
        });
        assert_eq!(EventDefinition::extract_when(&body, fixed_now).unwrap(), modified);

        let body = json!({"timestamp": "", "_context_timestamp": then.to_rfc3339()});
        assert_eq!(EventDefinition::extract_when(&body, fixed_now).unwrap(), then);

        assert_eq!(EventDefinition::extract_when(&json!({}), fixed_now).unwrap(), now);

        let body = json!({"timestamp": "yesterday"});
        assert!(EventDefinition::extract_when(&body, fixed_now).is_err());
    }

    #[test]
    fn test_default_traits() {
        let cfg = json!({"event_type": "test.thing", "traits": {}});
        let def = EventDefinition::new(&cfg, &PluginRegistry::new()).unwrap();
        let names: Vec<&str> = def.traits().keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["service", "request_id", "tenant_id"]);
    }

    #[test]
    fn test_traits() {
        let def = edef(json!("test.thing"));
        assert_eq!(def.traits().len(), default_traits().len() + 2);
        assert!(def.traits().contains_key("host"));
        assert!(def.traits().contains_key("instance_id"));
    }

    #[test]
    fn test_explicit_trait_overrides_default() {
        let cfg = json!({
            "event_type": "test.thing",
            "traits": {"service": {"type": "text", "fields": "payload.service"}}
        });
        let def = EventDefinition::new(&cfg, &PluginRegistry::new()).unwrap();
        assert_eq!(def.traits().len(), 3);
        assert_eq!(def.traits()["service"].fields().raw, "payload.service");
    }
}
