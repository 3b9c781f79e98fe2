//! Attribute resolver
//!
//! Collects every attribute-bearing record of a file (`BA_DEF_`, `BA_DEF_DEF_`,
//! `BA_`, `CM_`, `VAL_`) and groups it by the object it targets. Nothing is
//! applied here: the builder applies the buffered result only after the whole
//! file has been read, so attributes may appear before or after the
//! declarations they modify.

use crate::dbc::attributes::{AttributeDefinition, AttributeKind, AttributeScope, RawValue};
use crate::dbc::lexer::{Cursor, Keyword, Record, Token};
use crate::types::parse_int;
use std::collections::{BTreeMap, HashMap};

/// Object an attribute record refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Global,
    Node(String),
    Message(u32),
    Signal(u32, String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Global => write!(f, "database"),
            Target::Node(name) => write!(f, "node {}", name),
            Target::Message(id) => write!(f, "message 0x{:X}", id),
            Target::Signal(id, name) => write!(f, "signal {} of message 0x{:X}", name, id),
        }
    }
}

/// Everything attached to one target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetAttributes {
    /// Line of the first record that referenced the target
    pub line: usize,
    pub comment: Option<String>,
    /// `BA_` values by attribute name, last record wins
    pub values: BTreeMap<String, RawValue>,
    /// `VAL_` table, last record wins
    pub value_table: Option<BTreeMap<i64, String>>,
}

/// Buffered attribute records of one file
#[derive(Debug, Clone, Default)]
pub struct ResolvedAttributes {
    pub definitions: Vec<AttributeDefinition>,
    pub defaults: Vec<(String, RawValue)>,
    pub targets: HashMap<Target, TargetAttributes>,
    /// Lines of attribute records that could not be understood
    pub malformed: Vec<(usize, Keyword)>,
}

impl ResolvedAttributes {
    pub fn get(&self, target: &Target) -> Option<&TargetAttributes> {
        self.targets.get(target)
    }

    /// Targets in a stable order
    pub fn sorted_targets(&self) -> Vec<(&Target, &TargetAttributes)> {
        let mut targets: Vec<_> = self.targets.iter().collect();
        targets.sort_by(|a, b| a.0.cmp(b.0));
        targets
    }
}

/// Accumulates attribute records until the file is complete
#[derive(Debug, Default)]
pub struct AttributeResolver {
    resolved: ResolvedAttributes,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the keywords this resolver consumes
    pub fn accepts(keyword: &Keyword) -> bool {
        matches!(
            keyword,
            Keyword::Ba | Keyword::BaDef | Keyword::BaDefDef | Keyword::Cm | Keyword::Val
        )
    }

    /// Buffer one record. Records of other keywords are ignored.
    pub fn push(&mut self, record: &Record) {
        let parsed = match record.keyword {
            Keyword::Ba => self.attribute_value(record),
            Keyword::BaDef => self.definition(record),
            Keyword::BaDefDef => self.default_value(record),
            Keyword::Cm => self.comment(record),
            Keyword::Val => self.value_table(record),
            _ => return,
        };

        if parsed.is_none() {
            log::debug!(
                "Malformed {} record at line {}",
                record.keyword.as_str(),
                record.line
            );
            self.resolved
                .malformed
                .push((record.line, record.keyword.clone()));
        }
    }

    pub fn finish(self) -> ResolvedAttributes {
        self.resolved
    }

    fn entry(&mut self, target: Target, line: usize) -> &mut TargetAttributes {
        self.resolved
            .targets
            .entry(target)
            .or_insert_with(|| TargetAttributes {
                line,
                ..Default::default()
            })
    }

    // BA_ "Name" [BU_ node | BO_ id | SG_ id signal] value;
    fn attribute_value(&mut self, record: &Record) -> Option<()> {
        let mut cursor = record.cursor();
        let name = cursor.string()?;
        let target = match target(&mut cursor)? {
            Some(target) => target,
            // EV_ and relation targets are not tracked
            None => return Some(()),
        };
        let value = raw_value(&mut cursor)?;

        self.entry(target, record.line)
            .values
            .insert(name.to_string(), value);
        Some(())
    }

    // BA_DEF_ [BU_|BO_|SG_|EV_] "Name" INT|HEX|FLOAT|STRING|ENUM ...;
    fn definition(&mut self, record: &Record) -> Option<()> {
        let mut cursor = record.cursor();
        let scope = match cursor.peek()? {
            Token::Ident(word) => {
                cursor.next();
                match word.as_str() {
                    "BU_" => AttributeScope::Node,
                    "BO_" => AttributeScope::Message,
                    "SG_" => AttributeScope::Signal,
                    _ => AttributeScope::Other,
                }
            }
            _ => AttributeScope::Global,
        };
        let name = cursor.string()?;
        let kind = match cursor.ident()? {
            "INT" => AttributeKind::Int {
                min: number_or(&mut cursor, 0),
                max: number_or(&mut cursor, 0),
            },
            "HEX" => AttributeKind::Hex {
                min: number_or(&mut cursor, 0),
                max: number_or(&mut cursor, 0),
            },
            "FLOAT" => AttributeKind::Float {
                min: cursor.number().and_then(|n| n.parse().ok()).unwrap_or(0.0),
                max: cursor.number().and_then(|n| n.parse().ok()).unwrap_or(0.0),
            },
            "STRING" => AttributeKind::String,
            "ENUM" => {
                let mut labels = Vec::new();
                while let Some(label) = cursor.string() {
                    labels.push(label.to_string());
                    if cursor.punct(',').is_none() {
                        break;
                    }
                }
                AttributeKind::Enum(labels)
            }
            _ => return None,
        };

        self.resolved
            .definitions
            .push(AttributeDefinition::new(name, scope, kind));
        Some(())
    }

    // BA_DEF_DEF_ "Name" value;
    fn default_value(&mut self, record: &Record) -> Option<()> {
        let mut cursor = record.cursor();
        let name = cursor.string()?;
        let value = raw_value(&mut cursor)?;
        self.resolved.defaults.push((name.to_string(), value));
        Some(())
    }

    // CM_ [BU_ node | BO_ id | SG_ id signal] "text";
    fn comment(&mut self, record: &Record) -> Option<()> {
        let mut cursor = record.cursor();
        let target = match target(&mut cursor)? {
            Some(target) => target,
            None => return Some(()),
        };
        let text = cursor.string()?;
        self.entry(target, record.line).comment = Some(text.to_string());
        Some(())
    }

    // VAL_ id signal (raw "label")* ;
    fn value_table(&mut self, record: &Record) -> Option<()> {
        let mut cursor = record.cursor();
        let id = match cursor.number() {
            Some(id) => message_id(id)?,
            // VAL_ on an environment variable
            None => return cursor.ident().map(|_| ()),
        };
        let signal = cursor.ident()?;

        let mut table = BTreeMap::new();
        while !cursor.is_at_end() {
            let raw = cursor.number().and_then(parse_value_key)?;
            let label = cursor.string()?;
            table.insert(raw, label.to_string());
        }

        self.entry(Target::Signal(id, signal.to_string()), record.line)
            .value_table = Some(table);
        Some(())
    }
}

/// Read an optional object selector. `Some(None)` means an untracked object kind.
fn target(cursor: &mut Cursor<'_>) -> Option<Option<Target>> {
    let word = match cursor.peek()? {
        Token::Ident(word) => word.as_str(),
        _ => return Some(Some(Target::Global)),
    };

    let target = match word {
        "BU_" => {
            cursor.next();
            Target::Node(cursor.ident()?.to_string())
        }
        "BO_" => {
            cursor.next();
            Target::Message(message_id(cursor.number()?)?)
        }
        "SG_" => {
            cursor.next();
            let id = message_id(cursor.number()?)?;
            Target::Signal(id, cursor.ident()?.to_string())
        }
        _ => {
            cursor.next();
            return Some(None);
        }
    };
    Some(Some(target))
}

fn raw_value(cursor: &mut Cursor<'_>) -> Option<RawValue> {
    if let Some(number) = cursor.number() {
        return Some(RawValue::Number(number.to_string()));
    }
    cursor.string().map(|s| RawValue::Text(s.to_string()))
}

fn number_or(cursor: &mut Cursor<'_>, fallback: i64) -> i64 {
    cursor.number().and_then(parse_int).unwrap_or(fallback)
}

fn parse_value_key(raw: &str) -> Option<i64> {
    parse_int(raw).or_else(|| raw.parse::<f64>().ok().map(|v| v as i64))
}

pub(crate) fn message_id(raw: &str) -> Option<u32> {
    parse_int(raw).and_then(|id| u32::try_from(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::lexer::Lexer;

    fn resolve(text: &str) -> ResolvedAttributes {
        let mut resolver = AttributeResolver::new();
        for record in Lexer::new(text) {
            resolver.push(&record);
        }
        resolver.finish()
    }

    #[test]
    fn test_targets_are_classified() {
        let resolved = resolve(
            r#"
BA_ "DBName" "Powertrain";
BA_ "NodeLayerModules" BU_ ECU1 "CANoeILNLVector.dll";
BA_ "GenMsgCycleTime" BO_ 256 100;
BA_ "GenSigStartValue" SG_ 256 Rpm 0x10;
CM_ BO_ 256 "Engine frame";
CM_ SG_ 256 Rpm "Engine speed";
"#,
        );

        let global = resolved.get(&Target::Global).unwrap();
        assert_eq!(
            global.values.get("DBName"),
            Some(&RawValue::Text("Powertrain".into()))
        );
        assert!(resolved.get(&Target::Node("ECU1".into())).is_some());

        let message = resolved.get(&Target::Message(256)).unwrap();
        assert_eq!(
            message.values.get("GenMsgCycleTime"),
            Some(&RawValue::Number("100".into()))
        );
        assert_eq!(message.comment.as_deref(), Some("Engine frame"));

        let signal = resolved.get(&Target::Signal(256, "Rpm".into())).unwrap();
        assert_eq!(
            signal.values.get("GenSigStartValue"),
            Some(&RawValue::Number("0x10".into()))
        );
        assert_eq!(signal.comment.as_deref(), Some("Engine speed"));
        assert!(resolved.malformed.is_empty());
    }

    #[test]
    fn test_definitions_and_defaults() {
        let resolved = resolve(
            r#"
BA_DEF_ BO_ "GenMsgSendType" ENUM "Cyclic","Spontaneous","IfActive";
BA_DEF_ SG_ "GenSigStartValue" FLOAT 0 100000;
BA_DEF_ "BusType" STRING ;
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 65535;
BA_DEF_DEF_ "GenMsgSendType" "Cyclic";
BA_DEF_DEF_ "GenMsgCycleTime" 0;
"#,
        );

        assert_eq!(resolved.definitions.len(), 4);
        let send_type = &resolved.definitions[0];
        assert_eq!(send_type.scope, AttributeScope::Message);
        assert_eq!(
            send_type.kind,
            AttributeKind::Enum(vec!["Cyclic".into(), "Spontaneous".into(), "IfActive".into()])
        );
        assert_eq!(resolved.definitions[2].scope, AttributeScope::Global);
        assert_eq!(
            resolved.definitions[3].kind,
            AttributeKind::Int { min: 0, max: 65535 }
        );
        assert_eq!(resolved.defaults.len(), 2);
    }

    #[test]
    fn test_value_tables() {
        let resolved = resolve("VAL_ 256 Mode 2 \"Auto\" 1 \"On\" 0 \"Off\" ;\nVAL_ EnvVar 0 \"x\";\n");
        let table = resolved
            .get(&Target::Signal(256, "Mode".into()))
            .and_then(|t| t.value_table.clone())
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&1).map(String::as_str), Some("On"));
        assert!(resolved.malformed.is_empty());
    }

    #[test]
    fn test_last_record_wins_and_malformed_is_reported() {
        let resolved = resolve(
            "BA_ \"GenMsgCycleTime\" BO_ 256 10;\nBA_ \"GenMsgCycleTime\" BO_ 256 20;\nBA_ BO_ 256;\n",
        );
        let message = resolved.get(&Target::Message(256)).unwrap();
        assert_eq!(
            message.values.get("GenMsgCycleTime"),
            Some(&RawValue::Number("20".into()))
        );
        assert_eq!(message.line, 1);
        assert_eq!(resolved.malformed, vec![(3, Keyword::Ba)]);
    }
}
