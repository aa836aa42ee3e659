//! Compiled trait definitions.
//!
//! A trait definition pulls one named, typed value out of a notification:
//!
//! ```yaml
//! instance_id:
//!   type: text
//!   fields: [payload.instance_uuid, payload.instance_id]
//! disk_gb:
//!   type: int
//!   fields: payload.image_meta.disk_gb
//! host_prefix:
//!   fields: publisher_id
//!   plugin:
//!     name: split
//!     parameters: {separator: ".", segment: 1}
//! ```

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::datatype::{Datatype, Trait};
use crate::error::{ConversionError, DefinitionError};
use crate::extraction::FieldPath;
use crate::plugin_registry::{PluginRegistry, TraitPlugin};

#[derive(Debug, Deserialize)]
struct TraitConfig {
    #[serde(rename = "type")]
    type_name: Option<String>,
    fields: Option<FieldsConfig>,
    plugin: Option<PluginConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldsConfig {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PluginConfig {
    Name(String),
    Spec {
        name: Option<String>,
        parameters: Option<Map<String, Value>>,
    },
}

/// One trait of an event definition, ready to extract.
pub struct TraitDefinition {
    name: String,
    datatype: Datatype,
    fields: FieldPath,
    plugin: Option<Box<dyn TraitPlugin>>,
}

impl TraitDefinition {
    /// Compile a trait definition from its configuration fragment.
    pub fn new(name: &str, cfg: &Value, plugins: &PluginRegistry) -> Result<Self, DefinitionError> {
        let config: TraitConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            DefinitionError::new(
                format!("unable to read definition of trait '{}': {}", name, e),
                cfg,
            )
        })?;

        let type_name = config.type_name.as_deref().unwrap_or("text");
        let datatype: Datatype = type_name.parse().map_err(|_| {
            DefinitionError::new(
                format!("invalid trait type '{}' for trait {}", type_name, name),
                cfg,
            )
        })?;

        let plugin = match config.plugin {
            None => None,
            Some(plugin_cfg) => {
                let (plugin_name, params) = match plugin_cfg {
                    PluginConfig::Name(plugin_name) => (plugin_name, Map::new()),
                    PluginConfig::Spec { name: None, .. } => {
                        return Err(DefinitionError::new(
                            format!(
                                "plugin specified, but no plugin name supplied for trait {}",
                                name
                            ),
                            cfg,
                        ));
                    }
                    PluginConfig::Spec {
                        name: Some(plugin_name),
                        parameters,
                    } => (plugin_name, parameters.unwrap_or_default()),
                };
                if !plugins.contains(&plugin_name) {
                    return Err(DefinitionError::new(
                        format!("no plugin named {} available for trait {}", plugin_name, name),
                        cfg,
                    ));
                }
                let plugin = plugins.create(&plugin_name, &params).map_err(|e| {
                    DefinitionError::new(
                        format!("cannot set up plugin for trait {}: {}", name, e),
                        cfg,
                    )
                })?;
                Some(plugin)
            }
        };

        let fields = match config.fields {
            None => {
                return Err(DefinitionError::new(
                    "required field in trait definition not specified: 'fields'",
                    cfg,
                ));
            }
            Some(FieldsConfig::One(path)) => FieldPath::parse(&path),
            Some(FieldsConfig::Many(paths)) => FieldPath::from_list(paths.as_slice()),
        }
        .map_err(|e| {
            DefinitionError::path(format!("parse error in path specification for {}", name), cfg, e)
        })?;

        Ok(Self {
            name: name.to_string(),
            datatype,
            fields,
            plugin,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn fields(&self) -> &FieldPath {
        &self.fields
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin.is_some()
    }

    /// Extract this trait from a notification body.
    ///
    /// Returns `Ok(None)` when the notification carries no usable value.
    /// A value that is present but cannot be converted to the declared type
    /// is an error.
    pub fn to_trait(&self, body: &Value) -> Result<Option<Trait>, ConversionError> {
        let matches = self.fields.find(body);

        let value = match &self.plugin {
            Some(plugin) => plugin.trait_value(&matches),
            None => matches.into_iter().next().map(|m| m.value),
        };

        let value = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        // some producers send "" where they mean null
        if self.datatype != Datatype::Text && value.as_str() == Some("") {
            return Ok(None);
        }

        let converted = self.datatype.convert(&value)?;
        Ok(Some(Trait::new(self.name.clone(), self.datatype, converted)))
    }
}

impl fmt::Debug for TraitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitDefinition")
            .field("name", &self.name)
            .field("datatype", &self.datatype)
            .field("fields", &self.fields.raw)
            .field("plugin", &self.plugin.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::TraitValue;
    use crate::error::PluginError;
    use crate::extraction::PathMatch;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn notification() -> Value {
        json!({
            "event_type": "test.thing",
            "message_id": "uuid-for-notif-0001",
            "priority": "INFO",
            "publisher_id": "compute.host-1-2-3",
            "timestamp": "2013-08-08 21:06:37.803826",
            "payload": {
                "instance_uuid": "uuid-for-instance-0001",
                "instance_id": "id-for-instance-0001",
                "instance_uuid2": null,
                "instance_id2": null,
                "host": "host-1-2-3",
                "bogus_date": "",
                "image_meta": {"disk_gb": "20", "thing": "whatzit"},
                "foobar": 50
            }
        })
    }

    type Calls = Arc<Mutex<Vec<Vec<PathMatch>>>>;
    type Built = Result<Box<dyn TraitPlugin>, PluginError>;

    struct Recording {
        calls: Calls,
        result: Option<Value>,
    }

    impl TraitPlugin for Recording {
        fn trait_value(&self, matches: &[PathMatch]) -> Option<Value> {
            self.calls.lock().unwrap().push(matches.to_vec());
            self.result.clone()
        }
    }

    /// Registry with a `test` plugin answering "foobar" and a `nothing`
    /// plugin answering `None`, both recording their calls and parameters.
    fn fake_registry() -> (PluginRegistry, Calls, Arc<Mutex<Vec<Map<String, Value>>>>) {
        let calls: Calls = Arc::default();
        let params_seen: Arc<Mutex<Vec<Map<String, Value>>>> = Arc::default();
        let mut registry = PluginRegistry::new();

        for (name, result) in [("test", Some(json!("foobar"))), ("nothing", None)] {
            let calls = Arc::clone(&calls);
            let params_seen = Arc::clone(&params_seen);
            registry.register(
                name,
                Box::new(move |params: &Map<String, Value>| -> Built {
                    params_seen.lock().unwrap().push(params.clone());
                    Ok(Box::new(Recording {
                        calls: Arc::clone(&calls),
                        result: result.clone(),
                    }))
                }),
            );
        }
        (registry, calls, params_seen)
    }

    fn tdef(cfg: Value) -> TraitDefinition {
        let (registry, _, _) = fake_registry();
        TraitDefinition::new("test_trait", &cfg, &registry).unwrap()
    }

    fn value_of(cfg: Value) -> Option<TraitValue> {
        tdef(cfg).to_trait(&notification()).unwrap().map(|t| t.value)
    }

    fn text(s: &str) -> Option<TraitValue> {
        Some(TraitValue::Text(s.to_string()))
    }

    #[test]
    fn test_bad_field_definition() {
        let (registry, _, _) = fake_registry();
        assert!(TraitDefinition::new("test_trait", &json!("foo"), &registry).is_err());
    }

    #[test]
    fn test_to_trait_with_plugin() {
        let (registry, calls, params) = fake_registry();
        let cfg = json!({
            "type": "text",
            "fields": ["payload.instance_id", "payload.instance_uuid"],
            "plugin": {"name": "test"}
        });
        let def = TraitDefinition::new("test_trait", &cfg, &registry).unwrap();

        let t = def.to_trait(&notification()).unwrap().unwrap();
        assert_eq!(t.name, "test_trait");
        assert_eq!(t.datatype, Datatype::Text);
        assert_eq!(t.value, TraitValue::Text("foobar".to_string()));

        assert_eq!(*params.lock().unwrap(), vec![Map::new()]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![vec![
                PathMatch::new("payload.instance_id", json!("id-for-instance-0001")),
                PathMatch::new("payload.instance_uuid", json!("uuid-for-instance-0001")),
            ]]
        );
    }

    #[test]
    fn test_to_trait_null_match_with_plugin() {
        let (registry, calls, _) = fake_registry();
        let cfg = json!({
            "fields": ["payload.nothere", "payload.bogus"],
            "plugin": {"name": "test"}
        });
        let def = TraitDefinition::new("test_trait", &cfg, &registry).unwrap();

        let t = def.to_trait(&notification()).unwrap().unwrap();
        assert_eq!(t.value, TraitValue::Text("foobar".to_string()));
        assert_eq!(*calls.lock().unwrap(), vec![Vec::<PathMatch>::new()]);
    }

    #[test]
    fn test_to_trait_with_plugin_null() {
        let (registry, calls, _) = fake_registry();
        let cfg = json!({
            "fields": ["payload.instance_id", "payload.instance_uuid"],
            "plugin": {"name": "nothing"}
        });
        let def = TraitDefinition::new("test_trait", &cfg, &registry).unwrap();

        assert!(def.to_trait(&notification()).unwrap().is_none());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_to_trait_with_plugin_with_parameters() {
        let (registry, _, params) = fake_registry();
        let cfg = json!({
            "fields": "payload.instance_id",
            "plugin": {"name": "test", "parameters": {"a": 1, "b": "foo"}}
        });
        TraitDefinition::new("test_trait", &cfg, &registry).unwrap();

        let expected = json!({"a": 1, "b": "foo"});
        assert_eq!(params.lock().unwrap()[0], *expected.as_object().unwrap());
    }

    #[test]
    fn test_plugin_by_bare_name_and_null_parameters() {
        let (registry, _, params) = fake_registry();
        for cfg in [
            json!({"fields": "payload.host", "plugin": "test"}),
            json!({"fields": "payload.host", "plugin": {"name": "test", "parameters": null}}),
        ] {
            assert!(TraitDefinition::new("t", &cfg, &registry).unwrap().has_plugin());
        }
        assert_eq!(*params.lock().unwrap(), vec![Map::new(), Map::new()]);
    }

    #[test]
    fn test_to_trait() {
        assert_eq!(
            value_of(json!({"type": "text", "fields": "payload.instance_id"})),
            text("id-for-instance-0001")
        );

        let t = tdef(json!({"type": "int", "fields": "payload.image_meta.disk_gb"}))
            .to_trait(&notification())
            .unwrap()
            .unwrap();
        assert_eq!(t.datatype, Datatype::Int);
        assert_eq!(t.value, TraitValue::Int(20));
    }

    #[test]
    fn test_to_trait_multiple() {
        assert_eq!(
            value_of(json!({"fields": ["payload.instance_id", "payload.instance_uuid"]})),
            text("id-for-instance-0001")
        );
        assert_eq!(
            value_of(json!({"fields": ["payload.instance_uuid", "payload.instance_id"]})),
            text("uuid-for-instance-0001")
        );
    }

    #[test]
    fn test_to_trait_multiple_different_nesting() {
        assert_eq!(
            value_of(json!({
                "type": "int",
                "fields": ["payload.foobar", "payload.image_meta.disk_gb"]
            })),
            Some(TraitValue::Int(50))
        );
        assert_eq!(
            value_of(json!({
                "type": "int",
                "fields": ["payload.image_meta.disk_gb", "payload.foobar"]
            })),
            Some(TraitValue::Int(20))
        );
    }

    #[test]
    fn test_to_trait_some_null_or_missing_multiple() {
        assert_eq!(
            value_of(json!({"fields": ["payload.instance_id2", "payload.instance_uuid"]})),
            text("uuid-for-instance-0001")
        );
        assert_eq!(
            value_of(json!({"fields": ["payload.not_here_boss", "payload.instance_uuid"]})),
            text("uuid-for-instance-0001")
        );
    }

    #[test]
    fn test_to_trait_absent() {
        assert_eq!(value_of(json!({"fields": "payload.not_here_boss"})), None);
        assert_eq!(value_of(json!({"fields": "payload.instance_id2"})), None);
        assert_eq!(
            value_of(json!({"fields": ["payload.not_here_boss", "payload.instance_id2"]})),
            None
        );
    }

    #[test]
    fn test_to_trait_empty_nontext() {
        assert_eq!(value_of(json!({"type": "datetime", "fields": "payload.bogus_date"})), None);
        // first match wins, so a later non-empty path does not rescue it
        assert_eq!(
            value_of(json!({"type": "datetime", "fields": ["payload.bogus_date", "timestamp"]})),
            None
        );
        assert_eq!(value_of(json!({"type": "text", "fields": "payload.bogus_date"})), text(""));
    }

    #[test]
    fn test_to_trait_conversion_failure_is_an_error() {
        let def = tdef(json!({"type": "int", "fields": "payload.host"}));
        let err = def.to_trait(&notification()).unwrap_err();
        assert_eq!(err.datatype, "int");
        assert_eq!(err.value, json!("host-1-2-3"));
    }

    #[test]
    fn test_missing_fields_config() {
        let (registry, _, _) = fake_registry();
        let err = TraitDefinition::new("bogus_trait", &json!({}), &registry).unwrap_err();
        assert!(err.message.contains("'fields'"));
        assert_eq!(err.definition, json!({}));
    }

    #[test]
    fn test_string_and_list_fields_config() {
        let single = tdef(json!({"fields": "payload.test"}));
        assert_eq!(single.fields(), &FieldPath::parse("payload.test").unwrap());

        let list = tdef(json!({"fields": ["payload.test", "payload.other"]}));
        assert_eq!(
            list.fields().alternatives,
            FieldPath::parse("(payload.test)|(payload.other)").unwrap().alternatives
        );

        let one_element = tdef(json!({"fields": ["payload.test"]}));
        assert_eq!(one_element.fields(), single.fields());
    }

    #[test]
    fn test_invalid_definitions() {
        let (registry, _, _) = fake_registry();
        for cfg in [
            json!({"fields": "payload.bogus("}),
            json!({"fields": []}),
            json!({"fields": "payload.test", "plugin": {"bogus": "true"}}),
            json!({"fields": "payload.test", "plugin": {"name": "bogus"}}),
            json!({"type": "bogus", "fields": "payload.test"}),
        ] {
            let err = TraitDefinition::new("bogus_trait", &cfg, &registry).unwrap_err();
            assert_eq!(err.definition, cfg);
        }
    }

    #[test]
    fn test_bad_path_keeps_syntax_error() {
        use std::error::Error;

        let (registry, _, _) = fake_registry();
        let cfg = json!({"fields": "payload.bogus("});
        let err = TraitDefinition::new("bogus_trait", &cfg, &registry).unwrap_err();

        let path_error = err.path_error.as_ref().unwrap();
        assert_eq!(path_error.path, "payload.bogus(");
        assert!(err.source().is_some());

        let bad_type = json!({"type": "bogus", "fields": "a"});
        let other = TraitDefinition::new("bogus_trait", &bad_type, &registry).unwrap_err();
        assert!(other.path_error.is_none());
    }

    #[test]
    fn test_type_config() {
        for (name, datatype) in [
            ("text", Datatype::Text),
            ("int", Datatype::Int),
            ("float", Datatype::Float),
            ("datetime", Datatype::Datetime),
        ] {
            assert_eq!(tdef(json!({"type": name, "fields": "payload.test"})).datatype(), datatype);
        }
        assert_eq!(tdef(json!({"fields": "payload.test"})).datatype(), Datatype::Text);
    }
}
