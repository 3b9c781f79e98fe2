//! Database model
//!
//! One [`Database`] per parsed DBC file, owning its [`Message`]s in declaration
//! order, each owning its [`Signal`]s in declaration order. Every compared
//! column is addressable through [`MessageField`] / [`SignalField`] and projected
//! to a typed [`Value`].

use crate::dbc::attributes::AttributeDictionary;
use crate::types::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Byte order for signal layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format, `@1`)
    LittleEndian,
    /// Big-endian (Motorola format, `@0`)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    /// Signed integer (`-`)
    Signed,
    /// Unsigned integer (`+`)
    Unsigned,
}

/// A CAN signal definition (`SG_`)
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Signal name, unique within its message
    pub name: String,
    /// Raw multiplexer indicator (`M`, `m3`), kept but not compared
    pub multiplexer: Option<String>,
    /// Start bit as written in the file
    pub start_bit: u32,
    /// Length in bits
    pub length: u32,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "km/h", "V")
    pub unit: String,
    /// Receiving nodes in declaration order
    pub receivers: Vec<String>,
    /// `CM_ SG_` comment
    pub comment: String,
    /// `VAL_` table (raw value -> description)
    pub value_table: BTreeMap<i64, String>,
    /// Tracked `BA_` attributes, resolved and defaulted
    pub attributes: BTreeMap<String, Value>,
}

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multiplexer: None,
            start_bit: 0,
            length: 0,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: String::new(),
            receivers: Vec::new(),
            comment: String::new(),
            value_table: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Resolved attribute value, `Absent` if not tracked
    pub fn attribute(&self, name: &str) -> Value {
        self.attributes.get(name).cloned().unwrap_or_default()
    }

    /// Long symbol when present and different from the name, otherwise the name
    pub fn display_name(&self) -> &str {
        match self.attributes.get(LONG_SIGNAL_SYMBOL) {
            Some(Value::Text(long)) if !long.is_empty() && *long != self.name => long,
            _ => &self.name,
        }
    }

    /// Project one compared column
    pub fn field(&self, field: SignalField) -> Value {
        match field {
            SignalField::Name => Value::text(self.display_name()),
            SignalField::Start => Value::Int(i64::from(self.start_bit)),
            SignalField::Length => Value::Int(i64::from(self.length)),
            SignalField::Endian => Value::Text(
                match self.byte_order {
                    ByteOrder::BigEndian => "big",
                    ByteOrder::LittleEndian => "little",
                }
                .to_string(),
            ),
            SignalField::Signed => Value::Text(
                match self.value_type {
                    ValueType::Signed => "signed",
                    ValueType::Unsigned => "unsigned",
                }
                .to_string(),
            ),
            SignalField::Scale => Value::Float(self.factor),
            SignalField::Offset => Value::Float(self.offset),
            SignalField::Min => Value::Float(self.min),
            SignalField::Max => Value::Float(self.max),
            SignalField::Unit => Value::text(self.unit.as_str()),
            SignalField::ValueDesc => Value::Table(self.value_table.clone()),
            SignalField::Comment => Value::text(self.comment.as_str()),
            SignalField::Receivers => Value::List(self.receivers.clone()),
            attribute_field => attribute_field
                .attribute()
                .map(|name| self.attribute(name))
                .unwrap_or_default(),
        }
    }

    /// All 18 columns in [`SignalField::ALL`] order
    pub fn fields(&self) -> Vec<Value> {
        SignalField::ALL.iter().map(|&f| self.field(f)).collect()
    }
}

/// A CAN message definition (`BO_`)
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// CAN message ID (join key)
    pub id: u32,
    /// Message name (informational)
    pub name: String,
    /// Declared data length
    pub dlc: u32,
    /// Transmitting node
    pub transmitter: String,
    /// `CM_ BO_` comment
    pub comment: String,
    /// Tracked `BA_` attributes, resolved and defaulted
    pub attributes: BTreeMap<String, Value>,
    /// Signals in declaration order
    pub signals: Vec<Signal>,
}

impl Message {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            dlc: 0,
            transmitter: String::new(),
            comment: String::new(),
            attributes: BTreeMap::new(),
            signals: Vec::new(),
        }
    }

    pub fn id_hex(&self) -> String {
        format!("0x{:X}", self.id)
    }

    pub fn attribute(&self, name: &str) -> Value {
        self.attributes.get(name).cloned().unwrap_or_default()
    }

    pub fn display_name(&self) -> &str {
        match self.attributes.get(LONG_MESSAGE_SYMBOL) {
            Some(Value::Text(long)) if !long.is_empty() && *long != self.name => long,
            _ => &self.name,
        }
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn signal_mut(&mut self, name: &str) -> Option<&mut Signal> {
        self.signals.iter_mut().find(|s| s.name == name)
    }

    /// Append a signal; a second signal with the same name replaces the first.
    /// Returns the replaced signal.
    pub fn add_signal(&mut self, signal: Signal) -> Option<Signal> {
        match self.signals.iter().position(|s| s.name == signal.name) {
            Some(idx) => Some(std::mem::replace(&mut self.signals[idx], signal)),
            None => {
                self.signals.push(signal);
                None
            }
        }
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.name.as_str())
    }

    /// Project one compared column
    pub fn field(&self, field: MessageField) -> Value {
        match field {
            MessageField::Id => Value::Int(i64::from(self.id)),
            MessageField::Name => Value::text(self.display_name()),
            MessageField::Dlc => Value::Int(i64::from(self.dlc)),
            MessageField::Transmitter => Value::text(self.transmitter.as_str()),
            MessageField::MsgComment => Value::text(self.comment.as_str()),
            attribute_field => attribute_field
                .attribute()
                .map(|name| self.attribute(name))
                .unwrap_or_default(),
        }
    }

    /// All 19 columns in [`MessageField::ALL`] order
    pub fn fields(&self) -> Vec<Value> {
        MessageField::ALL.iter().map(|&f| self.field(f)).collect()
    }
}

pub(crate) const LONG_MESSAGE_SYMBOL: &str = "SystemMessageLongSymbol";
pub(crate) const LONG_SIGNAL_SYMBOL: &str = "SystemSignalLongSymbol";

/// The 19 compared message columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MessageField {
    Id,
    Name,
    SendType,
    CycleTime,
    CycleTimeFast,
    CycleTimeActive,
    NrOfRepetition,
    DelayTime,
    StartDelayTime,
    Dlc,
    VFrameFormat,
    #[serde(rename = "CANFD_BRS")]
    CanfdBrs,
    Transmitter,
    ILSupport,
    NmMessage,
    DiagRequest,
    DiagResponse,
    DiagState,
    MsgComment,
}

impl MessageField {
    pub const ALL: [MessageField; 19] = [
        MessageField::Id,
        MessageField::Name,
        MessageField::SendType,
        MessageField::CycleTime,
        MessageField::CycleTimeFast,
        MessageField::CycleTimeActive,
        MessageField::NrOfRepetition,
        MessageField::DelayTime,
        MessageField::StartDelayTime,
        MessageField::Dlc,
        MessageField::VFrameFormat,
        MessageField::CanfdBrs,
        MessageField::Transmitter,
        MessageField::ILSupport,
        MessageField::NmMessage,
        MessageField::DiagRequest,
        MessageField::DiagResponse,
        MessageField::DiagState,
        MessageField::MsgComment,
    ];

    /// Column header
    pub fn name(self) -> &'static str {
        match self {
            MessageField::Id => "Id",
            MessageField::Name => "Name",
            MessageField::SendType => "SendType",
            MessageField::CycleTime => "CycleTime",
            MessageField::CycleTimeFast => "CycleTimeFast",
            MessageField::CycleTimeActive => "CycleTimeActive",
            MessageField::NrOfRepetition => "NrOfRepetition",
            MessageField::DelayTime => "DelayTime",
            MessageField::StartDelayTime => "StartDelayTime",
            MessageField::Dlc => "Dlc",
            MessageField::VFrameFormat => "VFrameFormat",
            MessageField::CanfdBrs => "CANFD_BRS",
            MessageField::Transmitter => "Transmitter",
            MessageField::ILSupport => "ILSupport",
            MessageField::NmMessage => "NmMessage",
            MessageField::DiagRequest => "DiagRequest",
            MessageField::DiagResponse => "DiagResponse",
            MessageField::DiagState => "DiagState",
            MessageField::MsgComment => "MsgComment",
        }
    }

    /// `BA_` attribute backing this column, if any
    pub fn attribute(self) -> Option<&'static str> {
        match self {
            MessageField::SendType => Some("GenMsgSendType"),
            MessageField::CycleTime => Some("GenMsgCycleTime"),
            MessageField::CycleTimeFast => Some("GenMsgCycleTimeFast"),
            MessageField::CycleTimeActive => Some("GenMsgCycleTimeActive"),
            MessageField::NrOfRepetition => Some("GenMsgNrOfRepetition"),
            MessageField::DelayTime => Some("GenMsgDelayTime"),
            MessageField::StartDelayTime => Some("GenMsgStartDelayTime"),
            MessageField::VFrameFormat => Some("VFrameFormat"),
            MessageField::CanfdBrs => Some("CANFD_BRS"),
            MessageField::ILSupport => Some("GenMsgILSupport"),
            MessageField::NmMessage => Some("NmMessage"),
            MessageField::DiagRequest => Some("DiagRequest"),
            MessageField::DiagResponse => Some("DiagResponse"),
            MessageField::DiagState => Some("DiagState"),
            MessageField::Id
            | MessageField::Name
            | MessageField::Dlc
            | MessageField::Transmitter
            | MessageField::MsgComment => None,
        }
    }

    /// Every attribute a message keeps (the column attributes plus the long symbol)
    pub fn tracked_attributes() -> impl Iterator<Item = &'static str> {
        Self::ALL
            .iter()
            .filter_map(|f| f.attribute())
            .chain(std::iter::once(LONG_MESSAGE_SYMBOL))
    }
}

impl fmt::Display for MessageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The 18 compared signal columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SignalField {
    Name,
    Start,
    Length,
    Endian,
    Signed,
    Scale,
    Offset,
    Min,
    Max,
    Unit,
    InvalidValue,
    StartValue,
    InactiveValue,
    SendType,
    TimeoutTime,
    ValueDesc,
    Comment,
    Receivers,
}

impl SignalField {
    pub const ALL: [SignalField; 18] = [
        SignalField::Name,
        SignalField::Start,
        SignalField::Length,
        SignalField::Endian,
        SignalField::Signed,
        SignalField::Scale,
        SignalField::Offset,
        SignalField::Min,
        SignalField::Max,
        SignalField::Unit,
        SignalField::InvalidValue,
        SignalField::StartValue,
        SignalField::InactiveValue,
        SignalField::SendType,
        SignalField::TimeoutTime,
        SignalField::ValueDesc,
        SignalField::Comment,
        SignalField::Receivers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalField::Name => "Name",
            SignalField::Start => "Start",
            SignalField::Length => "Length",
            SignalField::Endian => "Endian",
            SignalField::Signed => "Signed",
            SignalField::Scale => "Scale",
            SignalField::Offset => "Offset",
            SignalField::Min => "Min",
            SignalField::Max => "Max",
            SignalField::Unit => "Unit",
            SignalField::InvalidValue => "InvalidValue",
            SignalField::StartValue => "StartValue",
            SignalField::InactiveValue => "InactiveValue",
            SignalField::SendType => "SendType",
            SignalField::TimeoutTime => "TimeoutTime",
            SignalField::ValueDesc => "ValueDesc",
            SignalField::Comment => "Comment",
            SignalField::Receivers => "Receivers",
        }
    }

    pub fn attribute(self) -> Option<&'static str> {
        match self {
            SignalField::InvalidValue => Some("InvalidValue"),
            SignalField::StartValue => Some("GenSigStartValue"),
            SignalField::InactiveValue => Some("GenSigInactiveValue"),
            SignalField::SendType => Some("GenSigSendType"),
            SignalField::TimeoutTime => Some("GenSigTimeoutTime_ALL"),
            _ => None,
        }
    }

    pub fn tracked_attributes() -> impl Iterator<Item = &'static str> {
        Self::ALL
            .iter()
            .filter_map(|f| f.attribute())
            .chain(std::iter::once(LONG_SIGNAL_SYMBOL))
    }
}

impl fmt::Display for SignalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A recovered parse anomaly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based source line, when known
    pub line: usize,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Line that belongs to no record
    SkippedLine,
    /// Record with a known keyword that could not be parsed
    MalformedRecord { keyword: String },
    /// `BO_` with an ID already declared; the later declaration replaced the earlier
    DuplicateMessage { id: u32 },
    /// Second `SG_` with the same name in one message; the later replaced the earlier
    DuplicateSignal { message_id: u32, name: String },
    /// `SG_` before any `BO_`
    OrphanedSignal { name: String },
    /// Attribute, comment or value table for an undeclared message or signal
    OrphanedAttribute { target: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            DiagnosticKind::SkippedLine => write!(f, "unrecognized line skipped"),
            DiagnosticKind::MalformedRecord { keyword } => {
                write!(f, "malformed {} record skipped", keyword)
            }
            DiagnosticKind::DuplicateMessage { id } => {
                write!(f, "duplicate message ID 0x{:X}, later declaration kept", id)
            }
            DiagnosticKind::DuplicateSignal { message_id, name } => write!(
                f,
                "duplicate signal {} in message 0x{:X}, later declaration kept",
                name, message_id
            ),
            DiagnosticKind::OrphanedSignal { name } => {
                write!(f, "signal {} declared outside any message", name)
            }
            DiagnosticKind::OrphanedAttribute { target } => {
                write!(f, "attribute data for undeclared {} dropped", target)
            }
        }
    }
}

/// One parsed DBC file: one version of one bus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    /// Bus name supplied by the bus matcher
    pub bus_name: String,
    /// `VERSION` string
    pub version: String,
    /// `BU_` node names
    pub nodes: Vec<String>,
    /// Global `DBName` attribute
    pub db_name: Option<String>,
    /// Global `BusType` attribute
    pub bus_type: Option<String>,
    /// Attribute dictionary in effect for this file
    pub dictionary: AttributeDictionary,
    /// Recovered parse anomalies, sorted by line
    pub diagnostics: Vec<Diagnostic>,
    messages: Vec<Message>,
    /// Message ID -> index into `messages`
    index: HashMap<u32, usize>,
}

impl Database {
    pub fn new(bus_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            ..Default::default()
        }
    }

    /// Add a message. A message with an ID already present replaces the earlier
    /// one in place; the replaced message is returned.
    pub fn insert_message(&mut self, message: Message) -> Option<Message> {
        match self.index.get(&message.id) {
            Some(&idx) => Some(std::mem::replace(&mut self.messages[idx], message)),
            None => {
                self.index.insert(message.id, self.messages.len());
                self.messages.push(message);
                None
            }
        }
    }

    pub fn message(&self, id: u32) -> Option<&Message> {
        self.index.get(&id).map(|&idx| &self.messages[idx])
    }

    pub fn message_mut(&mut self, id: u32) -> Option<&mut Message> {
        match self.index.get(&id) {
            Some(&idx) => self.messages.get_mut(idx),
            None => None,
        }
    }

    pub fn signal(&self, message_id: u32, name: &str) -> Option<&Signal> {
        self.message(message_id).and_then(|m| m.signal(name))
    }

    /// Messages in declaration order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub(crate) fn messages_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    pub fn message_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.messages.iter().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.iter().map(|m| m.signals.len()).sum(),
            num_nodes: self.nodes.len(),
            num_diagnostics: self.diagnostics.len(),
        }
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DatabaseStats {
    pub num_messages: usize,
    pub num_signals: usize,
    pub num_nodes: usize,
    pub num_diagnostics: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_message() -> Message {
        let mut message = Message::new(0x123, "EngineData");
        message.dlc = 8;
        message.transmitter = "ECU1".to_string();

        let mut signal = Signal::new("EngineSpeed");
        signal.length = 16;
        signal.max = 8000.0;
        signal.unit = "rpm".to_string();
        message.add_signal(signal);
        message
    }

    #[test]
    fn test_empty_database() {
        let db = Database::new("CAN1");
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
        assert!(db.is_empty());
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut db = Database::new("CAN1");
        assert!(db.insert_message(engine_message()).is_none());
        assert!(db.insert_message(Message::new(0x200, "Battery")).is_none());

        let stats = db.stats();
        assert_eq!(stats.num_messages, 2);
        assert_eq!(stats.num_signals, 1);

        let msg = db.message(0x123).unwrap();
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.id_hex(), "0x123");
        assert_eq!(db.signal(0x123, "EngineSpeed").unwrap().unit, "rpm");
        assert_eq!(db.message_ids().collect::<Vec<_>>(), vec![0x123, 0x200]);
    }

    #[test]
    fn test_duplicate_id_replaces_in_place() {
        let mut db = Database::new("CAN1");
        db.insert_message(engine_message());
        db.insert_message(Message::new(0x200, "Battery"));

        let replaced = db.insert_message(Message::new(0x123, "EngineData_v2"));

        assert_eq!(replaced.map(|m| m.name), Some("EngineData".to_string()));
        assert_eq!(db.len(), 2);
        let names: Vec<&str> = db.messages().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["EngineData_v2", "Battery"]);
    }

    #[test]
    fn test_field_projection() {
        let mut message = engine_message();
        message
            .attributes
            .insert("GenMsgCycleTime".to_string(), Value::Int(100));
        message.attributes.insert(
            LONG_MESSAGE_SYMBOL.to_string(),
            Value::Text("Engine_Data_Long".to_string()),
        );

        assert_eq!(message.fields().len(), 19);
        assert_eq!(message.field(MessageField::CycleTime), Value::Int(100));
        assert_eq!(message.field(MessageField::Name), Value::text("Engine_Data_Long"));
        assert_eq!(message.field(MessageField::MsgComment), Value::Absent);

        let signal = &message.signals[0];
        assert_eq!(signal.fields().len(), 18);
        assert_eq!(signal.field(SignalField::Length), Value::Int(16));
        assert_eq!(signal.field(SignalField::Endian), Value::text("little"));
        assert_eq!(signal.field(SignalField::Max), Value::Int(8000));
        assert_eq!(signal.field(SignalField::Receivers), Value::Absent);
    }

    #[test]
    fn test_field_tables() {
        assert_eq!(MessageField::ALL.len() + SignalField::ALL.len(), 37);
        assert_eq!(MessageField::CanfdBrs.name(), "CANFD_BRS");
        assert_eq!(SignalField::TimeoutTime.attribute(), Some("GenSigTimeoutTime_ALL"));
        assert!(MessageField::tracked_attributes().any(|a| a == LONG_MESSAGE_SYMBOL));
        assert_eq!(MessageField::tracked_attributes().count(), 15);
    }
}
