//! Diff engine
//!
//! Compares two versions of one bus and categorizes every difference. Messages
//! are joined by ID and signals by (message ID, signal name); names of
//! messages are informational only. Every column is compared with the
//! normalized equality of [`Value`].
//!
//! Signals of a message that exists on only one side are not reported
//! individually: the message category already implies them.

use crate::model::{Database, Message, MessageField, Signal, SignalField};
use crate::types::Value;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Message identity as shown in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub id: u32,
    pub name: String,
}

impl MessageRef {
    fn of(message: &Message) -> Self {
        Self {
            id: message.id,
            name: message.display_name().to_string(),
        }
    }

    pub fn id_hex(&self) -> String {
        format!("0x{:X}", self.id)
    }
}

/// Signal identity: owning message plus signal name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalRef {
    pub message: MessageRef,
    pub name: String,
}

impl SignalRef {
    fn of(message: &Message, signal: &Signal) -> Self {
        Self {
            message: MessageRef::of(message),
            name: signal.name.clone(),
        }
    }
}

/// One differing column with both values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange<F> {
    pub field: F,
    pub old: Value,
    pub new: Value,
}

/// A message present in both versions with at least one differing column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageChange {
    pub message: MessageRef,
    pub changes: Vec<FieldChange<MessageField>>,
}

impl MessageChange {
    pub fn changed_fields(&self) -> BTreeSet<MessageField> {
        self.changes.iter().map(|c| c.field).collect()
    }
}

/// A signal present in both versions with at least one differing column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalChange {
    pub signal: SignalRef,
    pub changes: Vec<FieldChange<SignalField>>,
}

impl SignalChange {
    pub fn changed_fields(&self) -> BTreeSet<SignalField> {
        self.changes.iter().map(|c| c.field).collect()
    }
}

/// Column of a full comparison row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "scope", content = "field")]
pub enum Column {
    Message(MessageField),
    Signal(SignalField),
}

impl Column {
    /// All 37 columns in row order
    pub fn all() -> impl Iterator<Item = Column> {
        MessageField::ALL
            .iter()
            .map(|&f| Column::Message(f))
            .chain(SignalField::ALL.iter().map(|&f| Column::Signal(f)))
    }

    /// Position within a 37-column row
    pub fn index(self) -> usize {
        match self {
            Column::Message(f) => f as usize,
            Column::Signal(f) => MessageField::ALL.len() + f as usize,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Message(field) => write!(f, "{}", field),
            Column::Signal(field) => write!(f, "{}", field),
        }
    }
}

/// One side of a full row: message columns, and signal columns when the signal exists on this side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSide {
    pub message: Vec<Value>,
    pub signal: Option<Vec<Value>>,
}

impl RowSide {
    fn new(message: &Message, signal: Option<&Signal>) -> Self {
        Self {
            message: message.fields(),
            signal: signal.map(Signal::fields),
        }
    }

    /// Value of one column; missing signal columns are `Absent`
    pub fn value(&self, column: Column) -> Value {
        match column {
            Column::Message(f) => self.message.get(f as usize).cloned().unwrap_or_default(),
            Column::Signal(f) => self
                .signal
                .as_ref()
                .and_then(|values| values.get(f as usize).cloned())
                .unwrap_or_default(),
        }
    }
}

/// One row of the full side-by-side comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullRow {
    pub message_id: u32,
    /// `None` for the message-only row of a signal-less message
    pub signal: Option<String>,
    /// `None` when the message does not exist in the old version
    pub old: Option<RowSide>,
    /// `None` when the message does not exist in the new version
    pub new: Option<RowSide>,
    pub differs: bool,
    pub changed_columns: BTreeSet<Column>,
}

impl FullRow {
    fn new(
        message_id: u32,
        signal: Option<&str>,
        old: Option<RowSide>,
        new: Option<RowSide>,
        differs: bool,
    ) -> Self {
        let changed_columns = match (&old, &new) {
            (Some(old), Some(new)) => Column::all()
                .filter(|&c| old.value(c) != new.value(c))
                .collect(),
            _ => Column::all().collect(),
        };
        Self {
            message_id,
            signal: signal.map(str::to_string),
            old,
            new,
            differs,
            changed_columns,
        }
    }
}

/// Categorized change-set between two versions of one bus
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub bus_name: String,
    pub new_messages: Vec<MessageRef>,
    pub removed_messages: Vec<MessageRef>,
    pub modified_messages: Vec<MessageChange>,
    pub unchanged_messages: Vec<MessageRef>,
    pub new_signals: Vec<SignalRef>,
    pub removed_signals: Vec<SignalRef>,
    pub modified_signals: Vec<SignalChange>,
    pub unchanged_signals: Vec<SignalRef>,
    pub full_rows: Vec<FullRow>,
}

/// Counts derived from a [`ComparisonResult`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub new_messages: usize,
    pub removed_messages: usize,
    pub modified_messages: usize,
    pub unchanged_messages: usize,
    pub new_signals: usize,
    pub removed_signals: usize,
    pub modified_signals: usize,
    pub unchanged_signals: usize,
    pub total_rows: usize,
    pub differing_rows: usize,
}

impl ComparisonSummary {
    /// Number of reported changes across all categories
    pub fn total_changes(&self) -> usize {
        self.new_messages
            + self.removed_messages
            + self.modified_messages
            + self.new_signals
            + self.removed_signals
            + self.modified_signals
    }
}

impl ComparisonResult {
    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            new_messages: self.new_messages.len(),
            removed_messages: self.removed_messages.len(),
            modified_messages: self.modified_messages.len(),
            unchanged_messages: self.unchanged_messages.len(),
            new_signals: self.new_signals.len(),
            removed_signals: self.removed_signals.len(),
            modified_signals: self.modified_signals.len(),
            unchanged_signals: self.unchanged_signals.len(),
            total_rows: self.full_rows.len(),
            differing_rows: self.full_rows.iter().filter(|r| r.differs).count(),
        }
    }

    /// True when no change of any kind was found
    pub fn is_empty(&self) -> bool {
        self.summary().total_changes() == 0
    }

    /// Rows flagged as differing
    pub fn differing_rows(&self) -> impl Iterator<Item = &FullRow> {
        self.full_rows.iter().filter(|r| r.differs)
    }
}

fn field_changes<F: Copy>(
    fields: &[F],
    old: impl Fn(F) -> Value,
    new: impl Fn(F) -> Value,
) -> Vec<FieldChange<F>> {
    fields
        .iter()
        .filter_map(|&field| {
            let (old, new) = (old(field), new(field));
            (old != new).then_some(FieldChange { field, old, new })
        })
        .collect()
}

/// Compare two versions of one bus
pub fn compare(old: &Database, new: &Database) -> ComparisonResult {
    let mut result = ComparisonResult {
        bus_name: if new.bus_name.is_empty() {
            old.bus_name.clone()
        } else {
            new.bus_name.clone()
        },
        ..Default::default()
    };

    let ids: BTreeSet<u32> = old.message_ids().chain(new.message_ids()).collect();

    for id in ids {
        match (old.message(id), new.message(id)) {
            (Some(old_msg), Some(new_msg)) => compare_message(&mut result, old_msg, new_msg),
            (Some(old_msg), None) => {
                result.removed_messages.push(MessageRef::of(old_msg));
                one_sided_rows(&mut result, old_msg, |side| (Some(side), None));
            }
            (None, Some(new_msg)) => {
                result.new_messages.push(MessageRef::of(new_msg));
                one_sided_rows(&mut result, new_msg, |side| (None, Some(side)));
            }
            (None, None) => {}
        }
    }

    log::debug!(
        "Compared bus '{}': {} rows, {} changes",
        result.bus_name,
        result.full_rows.len(),
        result.summary().total_changes()
    );
    result
}

fn one_sided_rows<F>(result: &mut ComparisonResult, message: &Message, sides: F)
where
    F: Fn(RowSide) -> (Option<RowSide>, Option<RowSide>),
{
    if message.signals.is_empty() {
        let (old, new) = sides(RowSide::new(message, None));
        result
            .full_rows
            .push(FullRow::new(message.id, None, old, new, true));
        return;
    }
    for signal in &message.signals {
        let (old, new) = sides(RowSide::new(message, Some(signal)));
        result
            .full_rows
            .push(FullRow::new(message.id, Some(&signal.name), old, new, true));
    }
}

fn compare_message(result: &mut ComparisonResult, old_msg: &Message, new_msg: &Message) {
    let message_changes = field_changes(
        &MessageField::ALL,
        |f| old_msg.field(f),
        |f| new_msg.field(f),
    );
    let message_modified = !message_changes.is_empty();
    if message_modified {
        result.modified_messages.push(MessageChange {
            message: MessageRef::of(new_msg),
            changes: message_changes,
        });
    } else {
        result.unchanged_messages.push(MessageRef::of(new_msg));
    }

    // old order, then signals only present in the new version
    let old_names: HashSet<&str> = old_msg.signal_names().collect();
    let names: Vec<&str> = old_msg
        .signal_names()
        .chain(new_msg.signal_names().filter(|n| !old_names.contains(n)))
        .collect();

    if names.is_empty() {
        result.full_rows.push(FullRow::new(
            new_msg.id,
            None,
            Some(RowSide::new(old_msg, None)),
            Some(RowSide::new(new_msg, None)),
            message_modified,
        ));
        return;
    }

    for name in names {
        let old_sig = old_msg.signal(name);
        let new_sig = new_msg.signal(name);

        let signal_differs = match (old_sig, new_sig) {
            (Some(old_sig), Some(new_sig)) => {
                let changes = field_changes(
                    &SignalField::ALL,
                    |f| old_sig.field(f),
                    |f| new_sig.field(f),
                );
                if changes.is_empty() {
                    result.unchanged_signals.push(SignalRef::of(new_msg, new_sig));
                    false
                } else {
                    result.modified_signals.push(SignalChange {
                        signal: SignalRef::of(new_msg, new_sig),
                        changes,
                    });
                    true
                }
            }
            (Some(old_sig), None) => {
                result.removed_signals.push(SignalRef::of(old_msg, old_sig));
                true
            }
            (None, Some(new_sig)) => {
                result.new_signals.push(SignalRef::of(new_msg, new_sig));
                true
            }
            (None, None) => continue,
        };

        result.full_rows.push(FullRow::new(
            new_msg.id,
            Some(name),
            Some(RowSide::new(old_msg, old_sig)),
            Some(RowSide::new(new_msg, new_sig)),
            message_modified || signal_differs,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::attributes::AttributeDictionary;
    use crate::dbc::parse_str;

    const BASE: &str = r#"VERSION ""
BU_: ECU1 ECU2

BO_ 256 Engine: 8 ECU1
 SG_ Rpm : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ Temp : 16|8@1+ (1,-40) [-40|215] "degC" ECU2

BO_ 512 Brake: 8 ECU2
 SG_ Pressure : 0|8@1+ (1,0) [0|255] "bar" ECU1

BO_ 768 Heartbeat: 0 ECU1

BA_ "GenMsgCycleTime" BO_ 256 100;
"#;

    fn db(text: &str) -> Database {
        parse_str(text, "PT", &AttributeDictionary::builtin())
    }

    #[test]
    fn test_identical_databases() {
        let base = db(BASE);
        let result = compare(&base, &base);

        assert!(result.is_empty());
        assert_eq!(result.summary().differing_rows, 0);
        assert_eq!(result.summary().unchanged_messages, 3);
        assert_eq!(result.summary().unchanged_signals, 3);
        // Heartbeat has no signals and gets a message-only row
        assert_eq!(result.full_rows.len(), 4);
        assert_eq!(result.full_rows[3].signal, None);
        assert!(result.full_rows.iter().all(|r| r.changed_columns.is_empty()));
    }

    #[test]
    fn test_hex_and_decimal_are_equal() {
        let hex = BASE.replace("BO_ 256 100;", "BO_ 256 0x64;");
        assert!(compare(&db(BASE), &db(&hex)).is_empty());
    }

    #[test]
    fn test_signal_length_change() {
        let new = BASE.replace("Temp : 16|8@1+", "Temp : 16|16@1+");
        let result = compare(&db(BASE), &db(&new));

        assert!(result.modified_messages.is_empty());
        assert_eq!(result.modified_signals.len(), 1);
        let change = &result.modified_signals[0];
        assert_eq!(change.signal.name, "Temp");
        assert_eq!(change.changed_fields(), BTreeSet::from([SignalField::Length]));
        assert_eq!(change.changes[0].old, Value::Int(8));
        assert_eq!(change.changes[0].new, Value::Int(16));

        let differing: Vec<&FullRow> = result.differing_rows().collect();
        assert_eq!(differing.len(), 1);
        assert_eq!(
            differing[0].changed_columns,
            BTreeSet::from([Column::Signal(SignalField::Length)])
        );
    }

    #[test]
    fn test_removed_message_signals_not_listed() {
        let new = BASE.replace(
            "BO_ 512 Brake: 8 ECU2\n SG_ Pressure : 0|8@1+ (1,0) [0|255] \"bar\" ECU1\n",
            "",
        );
        let result = compare(&db(BASE), &db(&new));

        assert_eq!(result.removed_messages.len(), 1);
        assert_eq!(result.removed_messages[0].id, 512);
        assert!(result.removed_signals.is_empty());

        let row = result.full_rows.iter().find(|r| r.message_id == 512).unwrap();
        assert!(row.differs);
        assert!(row.new.is_none());
        assert_eq!(row.changed_columns.len(), 37);
    }

    #[test]
    fn test_new_signal_and_message_change() {
        let new = BASE
            .replace(
                " SG_ Temp",
                " SG_ Oil : 24|8@1+ (1,0) [0|255] \"\" ECU2\n SG_ Temp",
            )
            .replace("BO_ 256 100;", "BO_ 256 50;");
        let result = compare(&db(BASE), &db(&new));

        assert_eq!(result.new_signals.len(), 1);
        assert_eq!(result.new_signals[0].name, "Oil");
        assert_eq!(result.modified_messages.len(), 1);
        assert_eq!(
            result.modified_messages[0].changed_fields(),
            BTreeSet::from([MessageField::CycleTime])
        );

        // old order first, then the new-only signal
        let engine_rows: Vec<&str> = result
            .full_rows
            .iter()
            .filter(|r| r.message_id == 256)
            .filter_map(|r| r.signal.as_deref())
            .collect();
        assert_eq!(engine_rows, vec!["Rpm", "Temp", "Oil"]);
        // the message changed, so every row of it differs
        assert!(result
            .full_rows
            .iter()
            .filter(|r| r.message_id == 256)
            .all(|r| r.differs));
    }

    #[test]
    fn test_rows_sorted_by_message_id() {
        let new = format!("{}\nBO_ 64 Early: 1 ECU1\n", BASE);
        let result = compare(&db(BASE), &db(&new));

        let ids: Vec<u32> = result.full_rows.iter().map(|r| r.message_id).collect();
        assert_eq!(ids, vec![64, 256, 256, 512, 768]);
        assert_eq!(result.new_messages[0].id_hex(), "0x40");
        assert!(result.full_rows[0].old.is_none());
    }

    #[test]
    fn test_column_indices() {
        assert_eq!(Column::Message(MessageField::Id).index(), 0);
        assert_eq!(Column::Signal(SignalField::Name).index(), 19);
        assert_eq!(Column::Signal(SignalField::Receivers).index(), 36);
        assert_eq!(Column::all().count(), 37);
    }
}
