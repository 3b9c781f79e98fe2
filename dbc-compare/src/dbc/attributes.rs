//! Attribute dictionary
//!
//! Describes which attributes exist, what type their values have and what value
//! applies when a message or signal carries no explicit `BA_` record. The
//! built-in dictionary covers the tracked attributes; each file extends a copy
//! of it with its own `BA_DEF_` / `BA_DEF_DEF_` records.

use crate::types::{parse_int, Value};
use std::collections::BTreeMap;

/// Object type an attribute applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeScope {
    Global,
    Node,
    Message,
    Signal,
    /// Environment variables and relation attributes
    Other,
}

/// Declared value type of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Int { min: i64, max: i64 },
    Hex { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    String,
    Enum(Vec<String>),
}

/// Attribute value exactly as written in a `BA_` / `BA_DEF_DEF_` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Bare numeric literal
    Number(String),
    /// Quoted string
    Text(String),
}

/// One attribute definition (`BA_DEF_`) with its default (`BA_DEF_DEF_`)
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefinition {
    pub name: String,
    pub scope: AttributeScope,
    pub kind: AttributeKind,
    pub default: Value,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, scope: AttributeScope, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            scope,
            kind,
            default: Value::Absent,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Resolve a raw value against this definition
    pub fn resolve(&self, raw: &RawValue) -> Value {
        match (&self.kind, raw) {
            (AttributeKind::Enum(labels), RawValue::Number(n)) => match parse_int(n) {
                Some(idx) if idx >= 0 && (idx as usize) < labels.len() => {
                    Value::Enum(labels[idx as usize].clone())
                }
                Some(idx) => {
                    log::debug!("Enum index {} out of range for attribute '{}'", idx, self.name);
                    Value::Int(idx)
                }
                None => Value::text(n.as_str()),
            },
            (AttributeKind::Enum(_), RawValue::Text(label)) => {
                if label.is_empty() {
                    Value::Absent
                } else {
                    Value::Enum(label.clone())
                }
            }
            (AttributeKind::String, RawValue::Text(s))
            | (AttributeKind::String, RawValue::Number(s)) => Value::text(s.as_str()),
            (_, RawValue::Number(n)) | (_, RawValue::Text(n)) => {
                Value::parse_number(n).unwrap_or_else(|| Value::text(n.as_str()))
            }
        }
    }
}

/// Read-only attribute catalogue handed to the database builder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeDictionary {
    definitions: BTreeMap<String, AttributeDefinition>,
}

const MSG_SEND_TYPES: &[&str] = &[
    "Cyclic", "NoMsgSendType", "NotUsed", "NotUsed", "NotUsed",
    "NotUsed", "NotUsed", "IfActive", "NoMsgSendType", "NotUsed",
];

const SIG_SEND_TYPES: &[&str] = &[
    "Cyclic", "NoSigSendType", "OnWriteWithRepetition", "OnChange",
    "OnChangeWithRepetition", "IfActive", "IfActiveWithRepetition", "NoSigSendType",
];

const VFRAME_FORMATS: &[&str] = &[
    "StandardCAN", "ExtendedCAN", "reserved", "J1939PG",
    "reserved", "reserved", "reserved", "reserved",
    "reserved", "reserved", "reserved", "reserved",
    "reserved", "reserved", "StandardCAN_FD", "ExtendedCAN_FD",
];

const NO_YES: &[&str] = &["No", "Yes"];

fn labels(list: &[&str]) -> AttributeKind {
    AttributeKind::Enum(list.iter().map(|s| s.to_string()).collect())
}

fn int_kind() -> AttributeKind {
    AttributeKind::Int {
        min: 0,
        max: i64::from(u32::MAX),
    }
}

impl AttributeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary of the tracked attributes with the conventional enum tables and defaults
    pub fn builtin() -> Self {
        use AttributeScope::{Global, Message, Signal};

        let enum_default = |label: &str| Value::Enum(label.to_string());
        let mut dictionary = Self::new();

        let definitions = vec![
            AttributeDefinition::new("DBName", Global, AttributeKind::String),
            AttributeDefinition::new("BusType", Global, AttributeKind::String),
            AttributeDefinition::new("GenMsgSendType", Message, labels(MSG_SEND_TYPES))
                .with_default(enum_default("Cyclic")),
            AttributeDefinition::new("GenMsgCycleTime", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("GenMsgCycleTimeFast", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("GenMsgCycleTimeActive", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("GenMsgNrOfRepetition", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("GenMsgDelayTime", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("GenMsgStartDelayTime", Message, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("VFrameFormat", Message, labels(VFRAME_FORMATS))
                .with_default(enum_default("StandardCAN_FD")),
            AttributeDefinition::new("CANFD_BRS", Message, labels(&["0", "1"]))
                .with_default(enum_default("1")),
            AttributeDefinition::new("GenMsgILSupport", Message, labels(NO_YES))
                .with_default(enum_default("Yes")),
            AttributeDefinition::new("NmMessage", Message, labels(NO_YES)).with_default(enum_default("No")),
            AttributeDefinition::new("DiagRequest", Message, labels(NO_YES)).with_default(enum_default("No")),
            AttributeDefinition::new("DiagResponse", Message, labels(NO_YES)).with_default(enum_default("No")),
            AttributeDefinition::new("DiagState", Message, labels(NO_YES)).with_default(enum_default("No")),
            AttributeDefinition::new("SystemMessageLongSymbol", Message, AttributeKind::String),
            AttributeDefinition::new("InvalidValue", Signal, AttributeKind::String),
            AttributeDefinition::new(
                "GenSigStartValue",
                Signal,
                AttributeKind::Float { min: f64::MIN, max: f64::MAX },
            )
            .with_default(Value::Int(0)),
            AttributeDefinition::new(
                "GenSigInactiveValue",
                Signal,
                AttributeKind::Float { min: f64::MIN, max: f64::MAX },
            )
            .with_default(Value::Int(0)),
            AttributeDefinition::new("GenSigSendType", Signal, labels(SIG_SEND_TYPES))
                .with_default(enum_default("Cyclic")),
            AttributeDefinition::new("GenSigTimeoutTime_ALL", Signal, int_kind()).with_default(Value::Int(0)),
            AttributeDefinition::new("SystemSignalLongSymbol", Signal, AttributeKind::String),
        ];

        for definition in definitions {
            dictionary.define(definition);
        }
        dictionary
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDefinition> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.definitions.values()
    }

    /// Add or replace a definition. A replacing definition without a default keeps the previous default.
    pub fn define(&mut self, mut definition: AttributeDefinition) {
        if let Some(existing) = self.definitions.get(&definition.name) {
            if definition.default.is_absent() && !existing.default.is_absent() {
                definition.default = existing.default.clone();
            }
        }
        self.definitions.insert(definition.name.clone(), definition);
    }

    /// Record a `BA_DEF_DEF_` default, resolved against the definition if one exists
    pub fn set_default(&mut self, name: &str, raw: &RawValue) {
        match self.definitions.get_mut(name) {
            Some(definition) => definition.default = definition.resolve(raw),
            None => log::debug!("Default for undefined attribute '{}' ignored", name),
        }
    }

    /// Copy of this dictionary extended with a file's own definitions and defaults
    pub fn extended_with(
        &self,
        definitions: &[AttributeDefinition],
        defaults: &[(String, RawValue)],
    ) -> Self {
        let mut dictionary = self.clone();
        for definition in definitions {
            dictionary.define(definition.clone());
        }
        for (name, raw) in defaults {
            dictionary.set_default(name, raw);
        }
        dictionary
    }

    /// Resolve a raw value to a typed value
    pub fn resolve(&self, name: &str, raw: &RawValue) -> Value {
        match self.definitions.get(name) {
            Some(definition) => definition.resolve(raw),
            None => match raw {
                RawValue::Number(n) => Value::parse_number(n).unwrap_or_else(|| Value::text(n.as_str())),
                RawValue::Text(s) => Value::text(s.as_str()),
            },
        }
    }

    /// Value that applies when no `BA_` record sets `name`
    pub fn default_value(&self, name: &str) -> Value {
        self.definitions
            .get(name)
            .map(|definition| definition.default.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_enum_resolution() {
        let dictionary = AttributeDictionary::builtin();
        assert_eq!(
            dictionary.resolve("GenMsgSendType", &RawValue::Number("7".into())),
            Value::Enum("IfActive".into())
        );
        assert_eq!(
            dictionary.resolve("VFrameFormat", &RawValue::Number("14".into())),
            Value::Enum("StandardCAN_FD".into())
        );
        assert_eq!(
            dictionary.resolve("GenMsgSendType", &RawValue::Number("42".into())),
            Value::Int(42)
        );
        assert_eq!(dictionary.default_value("GenMsgILSupport"), Value::Enum("Yes".into()));
        assert_eq!(dictionary.default_value("InvalidValue"), Value::Absent);
        assert_eq!(dictionary.default_value("NotDefinedAnywhere"), Value::Absent);
    }

    #[test]
    fn test_numeric_resolution_is_normalized() {
        let dictionary = AttributeDictionary::builtin();
        let decimal = dictionary.resolve("GenMsgCycleTime", &RawValue::Number("100".into()));
        let hex = dictionary.resolve("GenMsgCycleTime", &RawValue::Number("0x64".into()));
        assert_eq!(decimal, hex);
    }

    #[test]
    fn test_file_definitions_extend_builtin() {
        let builtin = AttributeDictionary::builtin();
        let file_defs = vec![AttributeDefinition::new(
            "GenMsgSendType",
            AttributeScope::Message,
            AttributeKind::Enum(vec!["Periodic".into(), "Event".into()]),
        )];
        let defaults = vec![("GenMsgCycleTime".to_string(), RawValue::Number("50".into()))];

        let extended = builtin.extended_with(&file_defs, &defaults);

        assert_eq!(
            extended.resolve("GenMsgSendType", &RawValue::Number("1".into())),
            Value::Enum("Event".into())
        );
        // replaced definition keeps the previous default when the file gives none
        assert_eq!(extended.default_value("GenMsgSendType"), Value::Enum("Cyclic".into()));
        assert_eq!(extended.default_value("GenMsgCycleTime"), Value::Int(50));
        // the run-wide dictionary is untouched
        assert_eq!(builtin.default_value("GenMsgCycleTime"), Value::Int(0));
    }

    #[test]
    fn test_enum_default_written_as_label() {
        let mut dictionary = AttributeDictionary::builtin();
        dictionary.set_default("GenSigSendType", &RawValue::Text("OnChange".into()));
        assert_eq!(dictionary.default_value("GenSigSendType"), Value::Enum("OnChange".into()));
    }
}
