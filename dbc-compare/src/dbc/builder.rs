//! Database builder
//!
//! Walks the record stream once, creating messages from `BO_` and signals from
//! `SG_` while buffering attribute records in an [`AttributeResolver`]. When the
//! stream ends the buffered attributes are applied in a second pass.

use crate::dbc::attributes::AttributeDictionary;
use crate::dbc::lexer::{Keyword, Record};
use crate::dbc::resolver::{message_id, AttributeResolver, ResolvedAttributes, Target};
use crate::model::{
    ByteOrder, Database, Diagnostic, DiagnosticKind, Message, MessageField, Signal, SignalField,
    ValueType,
};
use crate::types::parse_int;

/// Assembles one [`Database`] from the records of one file
pub struct DatabaseBuilder<'d> {
    dictionary: &'d AttributeDictionary,
    bus_name: String,
}

impl<'d> DatabaseBuilder<'d> {
    pub fn new(dictionary: &'d AttributeDictionary) -> Self {
        Self {
            dictionary,
            bus_name: String::new(),
        }
    }

    pub fn with_bus_name(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = bus_name.into();
        self
    }

    /// Consume every record and return the finished database
    pub fn build<I>(&self, records: I) -> Database
    where
        I: IntoIterator<Item = Record>,
    {
        let mut db = Database::new(self.bus_name.as_str());
        let mut resolver = AttributeResolver::new();
        let mut diagnostics = Vec::new();
        let mut current: Option<u32> = None;

        for record in records {
            match record.keyword {
                Keyword::Version => {
                    db.version = record.cursor().string().unwrap_or_default().to_string();
                }
                Keyword::Bu => {
                    let mut cursor = record.cursor();
                    cursor.punct(':');
                    while let Some(node) = cursor.ident() {
                        db.nodes.push(node.to_string());
                    }
                }
                Keyword::Bo => match parse_message(&record) {
                    Some(message) => {
                        let id = message.id;
                        if let Some(previous) = db.insert_message(message) {
                            log::warn!(
                                "Duplicate message ID 0x{:X} at line {} replaces '{}'",
                                id,
                                record.line,
                                previous.name
                            );
                            diagnostics.push(Diagnostic {
                                line: record.line,
                                kind: DiagnosticKind::DuplicateMessage { id },
                            });
                        }
                        current = Some(id);
                    }
                    None => {
                        malformed(&mut diagnostics, &record);
                        current = None;
                    }
                },
                Keyword::Sg => {
                    let Some(signal) = parse_signal(&record) else {
                        malformed(&mut diagnostics, &record);
                        continue;
                    };
                    match current.and_then(|id| db.message_mut(id)) {
                        Some(message) => {
                            let name = signal.name.clone();
                            if message.add_signal(signal).is_some() {
                                log::warn!(
                                    "Duplicate signal '{}' in message 0x{:X} at line {}",
                                    name,
                                    message.id,
                                    record.line
                                );
                                diagnostics.push(Diagnostic {
                                    line: record.line,
                                    kind: DiagnosticKind::DuplicateSignal {
                                        message_id: message.id,
                                        name,
                                    },
                                });
                            }
                        }
                        None => {
                            log::warn!(
                                "Signal '{}' at line {} has no enclosing message",
                                signal.name,
                                record.line
                            );
                            diagnostics.push(Diagnostic {
                                line: record.line,
                                kind: DiagnosticKind::OrphanedSignal { name: signal.name },
                            });
                        }
                    }
                }
                ref keyword if AttributeResolver::accepts(keyword) => resolver.push(&record),
                ref keyword => {
                    log::trace!("Ignoring {} record at line {}", keyword.as_str(), record.line);
                }
            }
        }

        let resolved = resolver.finish();
        for (line, keyword) in &resolved.malformed {
            diagnostics.push(Diagnostic {
                line: *line,
                kind: DiagnosticKind::MalformedRecord {
                    keyword: keyword.as_str().to_string(),
                },
            });
        }

        self.apply_attributes(&mut db, &resolved, &mut diagnostics);

        diagnostics.sort_by_key(|d| d.line);
        db.diagnostics = diagnostics;
        db
    }

    fn apply_attributes(
        &self,
        db: &mut Database,
        resolved: &ResolvedAttributes,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let dictionary = self
            .dictionary
            .extended_with(&resolved.definitions, &resolved.defaults);

        let global = |name: &str| {
            resolved
                .get(&Target::Global)
                .and_then(|attrs| attrs.values.get(name))
                .map(|raw| dictionary.resolve(name, raw))
                .filter(|value| !value.is_absent())
                .map(|value| value.to_string())
        };
        db.db_name = global("DBName");
        db.bus_type = global("BusType");

        for message in db.messages_mut() {
            let attrs = resolved.get(&Target::Message(message.id));
            for name in MessageField::tracked_attributes() {
                let value = match attrs.and_then(|a| a.values.get(name)) {
                    Some(raw) => dictionary.resolve(name, raw),
                    None => dictionary.default_value(name),
                };
                message.attributes.insert(name.to_string(), value);
            }
            if let Some(comment) = attrs.and_then(|a| a.comment.as_ref()) {
                message.comment = comment.clone();
            }

            let id = message.id;
            for signal in message.signals.iter_mut() {
                let attrs = resolved.get(&Target::Signal(id, signal.name.clone()));
                for name in SignalField::tracked_attributes() {
                    let value = match attrs.and_then(|a| a.values.get(name)) {
                        Some(raw) => dictionary.resolve(name, raw),
                        None => dictionary.default_value(name),
                    };
                    signal.attributes.insert(name.to_string(), value);
                }
                if let Some(attrs) = attrs {
                    if let Some(comment) = &attrs.comment {
                        signal.comment = comment.clone();
                    }
                    if let Some(table) = &attrs.value_table {
                        signal.value_table = table.clone();
                    }
                }
            }
        }

        for (target, attrs) in resolved.sorted_targets() {
            let declared = match target {
                Target::Global | Target::Node(_) => true,
                Target::Message(id) => db.message(*id).is_some(),
                Target::Signal(id, name) => db.signal(*id, name).is_some(),
            };
            if !declared {
                log::warn!(
                    "Dropping attribute data for undeclared {} (line {})",
                    target,
                    attrs.line
                );
                diagnostics.push(Diagnostic {
                    line: attrs.line,
                    kind: DiagnosticKind::OrphanedAttribute {
                        target: target.to_string(),
                    },
                });
            }
        }

        db.dictionary = dictionary;
    }
}

fn malformed(diagnostics: &mut Vec<Diagnostic>, record: &Record) {
    log::debug!(
        "Malformed {} record at line {}",
        record.keyword.as_str(),
        record.line
    );
    diagnostics.push(Diagnostic {
        line: record.line,
        kind: DiagnosticKind::MalformedRecord {
            keyword: record.keyword.as_str().to_string(),
        },
    });
}

// BO_ id name: dlc transmitter
fn parse_message(record: &Record) -> Option<Message> {
    let mut cursor = record.cursor();
    let id = message_id(cursor.number()?)?;
    let name = cursor.ident()?;
    cursor.punct(':')?;
    let dlc = parse_u32(cursor.number()?)?;

    let mut message = Message::new(id, name);
    message.dlc = dlc;
    message.transmitter = cursor.ident().unwrap_or_default().to_string();
    Some(message)
}

// SG_ name [mux] : start|length@order sign (factor,offset) [min|max] "unit" receivers
fn parse_signal(record: &Record) -> Option<Signal> {
    let mut cursor = record.cursor();
    let mut signal = Signal::new(cursor.ident()?);
    signal.multiplexer = cursor.ident().map(str::to_string);

    cursor.punct(':')?;
    signal.start_bit = parse_u32(cursor.number()?)?;
    cursor.punct('|')?;
    signal.length = parse_u32(cursor.number()?)?;
    cursor.punct('@')?;
    signal.byte_order = match cursor.number()? {
        "0" => ByteOrder::BigEndian,
        "1" => ByteOrder::LittleEndian,
        _ => return None,
    };
    signal.value_type = if cursor.punct('-').is_some() {
        ValueType::Signed
    } else {
        cursor.punct('+')?;
        ValueType::Unsigned
    };

    cursor.punct('(')?;
    signal.factor = parse_f64(cursor.number()?)?;
    cursor.punct(',')?;
    signal.offset = parse_f64(cursor.number()?)?;
    cursor.punct(')')?;

    cursor.punct('[')?;
    signal.min = parse_f64(cursor.number()?)?;
    cursor.punct('|')?;
    signal.max = parse_f64(cursor.number()?)?;
    cursor.punct(']')?;

    signal.unit = cursor.string().unwrap_or_default().to_string();
    while let Some(receiver) = cursor.ident() {
        signal.receivers.push(receiver.to_string());
        cursor.punct(',');
    }
    Some(signal)
}

fn parse_u32(raw: &str) -> Option<u32> {
    parse_int(raw).and_then(|v| u32::try_from(v).ok())
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .or_else(|| parse_int(raw).map(|v| v as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::lexer::Lexer;
    use crate::types::Value;

    const SAMPLE: &str = r#"VERSION "1.2"

NS_ :
	NS_DESC_
	CM_
	BA_DEF_

BS_:

BU_: ECU1 ECU2 Gateway

BO_ 256 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (0.25,0) [0|16383.75] "rpm" ECU2,Gateway
 SG_ EngineTemp : 16|8@1- (1,-40) [-40|215] "degC" ECU2

BO_ 512 Gear: 2 ECU2
 SG_ Mode M : 0|4@0+ (1,0) [0|15] "" Vector__XXX
 SG_ Reverse m1 : 8|1@0+ (1,0) [0|1] "" ECU1

CM_ BO_ 256 "Engine frame";
CM_ SG_ 256 EngineSpeed "Crankshaft
speed";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 65535;
BA_DEF_ "DBName" STRING ;
BA_DEF_DEF_ "GenMsgCycleTime" 100;
BA_ "DBName" "Powertrain";
BA_ "GenMsgCycleTime" BO_ 512 0x14;
BA_ "GenMsgSendType" BO_ 512 7;
BA_ "GenSigStartValue" SG_ 256 EngineTemp 40;
BA_ "SystemSignalLongSymbol" SG_ 512 Reverse "ReverseGearEngaged";
VAL_ 512 Mode 0 "Park" 1 "Drive" 2 "Reverse" ;
"#;

    fn build(text: &str) -> Database {
        let dictionary = AttributeDictionary::builtin();
        DatabaseBuilder::new(&dictionary)
            .with_bus_name("PT")
            .build(Lexer::new(text))
    }

    #[test]
    fn test_build_sample() {
        let db = build(SAMPLE);

        assert_eq!(db.bus_name, "PT");
        assert_eq!(db.version, "1.2");
        assert_eq!(db.nodes, vec!["ECU1", "ECU2", "Gateway"]);
        assert_eq!(db.db_name.as_deref(), Some("Powertrain"));
        assert_eq!(db.len(), 2);
        assert!(db.diagnostics.is_empty(), "{:?}", db.diagnostics);

        let engine = db.message(256).unwrap();
        assert_eq!(engine.dlc, 8);
        assert_eq!(engine.transmitter, "ECU1");
        assert_eq!(engine.comment, "Engine frame");
        // file default overrides the built-in default
        assert_eq!(engine.field(MessageField::CycleTime), Value::Int(100));
        assert_eq!(engine.field(MessageField::SendType), Value::Enum("Cyclic".into()));

        let speed = engine.signal("EngineSpeed").unwrap();
        assert_eq!(speed.length, 16);
        assert_eq!(speed.factor, 0.25);
        assert_eq!(speed.byte_order, ByteOrder::LittleEndian);
        assert_eq!(speed.receivers, vec!["ECU2", "Gateway"]);
        assert_eq!(speed.comment, "Crankshaft\nspeed");

        let temp = engine.signal("EngineTemp").unwrap();
        assert_eq!(temp.value_type, ValueType::Signed);
        assert_eq!(temp.offset, -40.0);
        assert_eq!(temp.field(SignalField::StartValue), Value::Int(40));

        let gear = db.message(512).unwrap();
        assert_eq!(gear.field(MessageField::CycleTime), Value::Int(20));
        assert_eq!(gear.field(MessageField::SendType), Value::Enum("IfActive".into()));

        let mode = gear.signal("Mode").unwrap();
        assert_eq!(mode.multiplexer.as_deref(), Some("M"));
        assert_eq!(mode.byte_order, ByteOrder::BigEndian);
        assert_eq!(mode.value_table.get(&2).map(String::as_str), Some("Reverse"));
        assert_eq!(mode.field(SignalField::Unit), Value::Absent);

        let reverse = gear.signal("Reverse").unwrap();
        assert_eq!(reverse.display_name(), "ReverseGearEngaged");
        assert_eq!(reverse.multiplexer.as_deref(), Some("m1"));
    }

    #[test]
    fn test_attributes_before_declarations() {
        let text = "BA_ \"GenMsgCycleTime\" BO_ 256 50;\nCM_ BO_ 256 \"early\";\nBO_ 256 Engine: 8 ECU1\n";
        let db = build(text);
        let engine = db.message(256).unwrap();
        assert_eq!(engine.field(MessageField::CycleTime), Value::Int(50));
        assert_eq!(engine.comment, "early");
    }

    #[test]
    fn test_duplicate_message_last_wins() {
        let text = "BO_ 256 First: 8 A\n SG_ Old : 0|8@1+ (1,0) [0|255] \"\" B\nBO_ 300 Other: 8 A\nBO_ 256 Second: 4 A\n SG_ New : 0|8@1+ (1,0) [0|255] \"\" B\n";
        let db = build(text);

        let names: Vec<&str> = db.messages().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "Other"]);
        let second = db.message(256).unwrap();
        assert_eq!(second.dlc, 4);
        assert_eq!(second.signal_names().collect::<Vec<_>>(), vec!["New"]);
        assert_eq!(
            db.diagnostics,
            vec![Diagnostic {
                line: 4,
                kind: DiagnosticKind::DuplicateMessage { id: 256 },
            }]
        );
    }

    #[test]
    fn test_orphans_and_duplicates_are_diagnostics() {
        let text = r#" SG_ Lost : 0|8@1+ (1,0) [0|255] "" B
BO_ 256 Engine: 8 A
 SG_ Rpm : 0|8@1+ (1,0) [0|255] "" B
 SG_ Rpm : 8|8@1+ (1,0) [0|255] "" B
BA_ "GenMsgCycleTime" BO_ 999 10;
CM_ SG_ 256 Missing "nobody";
"#;
        let db = build(text);

        let kinds: Vec<&DiagnosticKind> = db.diagnostics.iter().map(|d| &d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &DiagnosticKind::OrphanedSignal { name: "Lost".into() },
                &DiagnosticKind::DuplicateSignal {
                    message_id: 256,
                    name: "Rpm".into()
                },
                &DiagnosticKind::OrphanedAttribute {
                    target: "message 0x3E7".into()
                },
                &DiagnosticKind::OrphanedAttribute {
                    target: "signal Missing of message 0x100".into()
                },
            ]
        );
        assert_eq!(db.message(256).unwrap().signal("Rpm").unwrap().start_bit, 8);
    }

    #[test]
    fn test_malformed_records() {
        let text = "BO_ 256 Engine 8 A\n SG_ Rpm : 0|8@1+ (1,0) [0|255] \"\" B\nBO_ 512 Ok: 8 A\n SG_ Bad : 0|8@2+ (1,0) [0|255] \"\" B\n";
        let db = build(text);

        assert_eq!(db.len(), 1);
        assert!(db.message(512).unwrap().signals.is_empty());
        let lines: Vec<usize> = db.diagnostics.iter().map(|d| d.line).collect();
        // line 2 is an orphaned signal because its message was malformed
        assert_eq!(lines, vec![1, 2, 4]);
    }
}
