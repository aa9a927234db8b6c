//! Cache records and the per-component diff layout.
//!
//! A diff is one change bit per schema field followed by the values of the
//! changed fields, in field order.

use multiplay_protocol::{BitReader, BitWriter, ComponentId, ProtocolError};

use crate::schema::{ComponentSchema, ComponentState, FieldValue};

/// Host-side memory of what was last sent for one component of one entity.
#[derive(Debug, Clone, Default)]
pub struct CacheRecord {
    sent: Option<ComponentState>,
}

impl CacheRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been sent for this record yet.
    pub fn has_been_sent(&self) -> bool {
        self.sent.is_some()
    }

    pub fn sent(&self) -> Option<&ComponentState> {
        self.sent.as_ref()
    }

    /// Returns the change mask for `current`, or `None` if nothing changed.
    /// A record that was never sent reports every field.
    pub fn diff(&self, current: &ComponentState, epsilon: f32) -> Option<Vec<bool>> {
        let Some(sent) = &self.sent else {
            return Some(vec![true; current.len()]);
        };
        let mask: Vec<bool> = current
            .values()
            .iter()
            .enumerate()
            .map(|(i, value)| match sent.get(i) {
                Some(previous) => previous.differs_from(value, epsilon),
                None => true,
            })
            .collect();
        mask.iter().any(|changed| *changed).then_some(mask)
    }

    /// Writes through the fields named by `mask`. Unsent fields keep their
    /// old cached value so sub-epsilon drift accumulates until it is sent.
    pub fn commit(&mut self, current: &ComponentState, mask: &[bool]) {
        match &mut self.sent {
            Some(sent) if sent.len() == current.len() => {
                for (i, changed) in mask.iter().enumerate() {
                    if *changed {
                        if let Some(value) = current.get(i) {
                            sent.set(i, value.clone());
                        }
                    }
                }
            }
            _ => self.sent = Some(current.clone()),
        }
    }
}

pub(crate) fn write_diff(
    schema: &ComponentSchema,
    mask: &[bool],
    current: &ComponentState,
    writer: &mut BitWriter,
) {
    for changed in mask {
        writer.write_bool(*changed);
    }
    for ((kind, value), changed) in schema.fields.iter().zip(current.values()).zip(mask) {
        if *changed {
            kind.write(value, writer);
        }
    }
}

/// The decoded changes for one component of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDiff {
    pub component: ComponentId,
    /// `(field index, new value)` in field order.
    pub changes: Vec<(usize, FieldValue)>,
}

impl ComponentDiff {
    pub(crate) fn read(
        schema: &ComponentSchema,
        reader: &mut BitReader<'_>,
    ) -> Result<Self, ProtocolError> {
        let mut mask = Vec::with_capacity(schema.fields.len());
        for _ in &schema.fields {
            mask.push(reader.read_bool()?);
        }
        let mut changes = Vec::new();
        for (field, (kind, changed)) in schema.fields.iter().zip(mask).enumerate() {
            if changed {
                changes.push((field, kind.read(reader)?));
            }
        }
        Ok(Self {
            component: schema.id,
            changes,
        })
    }

    pub fn apply_to(&self, state: &mut ComponentState) {
        for (field, value) in &self.changes {
            state.set(*field, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    fn schema() -> ComponentSchema {
        ComponentSchema::new(
            ComponentId(2),
            "hose",
            vec![FieldKind::Bool, FieldKind::Float, FieldKind::Text],
        )
    }

    fn state(on: bool, pressure: f32, label: &str) -> ComponentState {
        ComponentState::new(vec![
            FieldValue::Bool(on),
            FieldValue::Float(pressure),
            FieldValue::Text(label.into()),
        ])
    }

    #[test]
    fn test_diff_unsent_record_reports_every_field() {
        let record = CacheRecord::new();
        assert_eq!(record.diff(&state(false, 0.0, ""), 0.0), Some(vec![true; 3]));
    }

    #[test]
    fn test_diff_unchanged_returns_none() {
        let mut record = CacheRecord::new();
        let s = state(true, 1.0, "a");
        record.commit(&s, &[true; 3]);
        assert_eq!(record.diff(&s, 0.001), None);
    }

    #[test]
    fn test_commit_keeps_unsent_fields() {
        let mut record = CacheRecord::new();
        record.commit(&state(true, 1.0, "a"), &[true; 3]);
        let next = state(true, 1.0004, "b");
        let mask = record.diff(&next, 0.0005).unwrap();
        assert_eq!(mask, vec![false, false, true]);
        record.commit(&next, &mask);
        // Pressure drifted below epsilon; the cache still holds 1.0.
        assert_eq!(record.sent(), Some(&state(true, 1.0, "b")));
    }

    #[test]
    fn test_write_then_read_diff_only_changed_fields() {
        let schema = schema();
        let current = state(false, 2.5, "x");
        let mut writer = BitWriter::new();
        write_diff(&schema, &[false, true, false], &current, &mut writer);
        assert_eq!(writer.bits_written(), 3 + 32);

        let raw = writer.into_raw();
        let diff = ComponentDiff::read(&schema, &mut raw.reader()).unwrap();
        assert_eq!(diff.changes, vec![(1, FieldValue::Float(2.5))]);

        let mut target = state(true, 0.0, "keep");
        diff.apply_to(&mut target);
        assert_eq!(target, state(true, 2.5, "keep"));
    }
}
