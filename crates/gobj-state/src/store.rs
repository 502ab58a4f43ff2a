//! Attribute store - per-instance typed values derived from a class schema

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use gobj_core::{AttrDesc, AttrFlags, AttrValue, GObjError, GObjResult, Kw};

/// Resolved attribute schema of a class
///
/// Built once per class and shared by every instance of it.
#[derive(Debug, Default)]
pub struct AttrSchema {
    entries: Vec<AttrDesc>,
    index: HashMap<&'static str, usize>,
}

impl AttrSchema {
    /// Validate and index schema entries.
    ///
    /// Names must be unique and explicit defaults must have the declared type.
    pub fn new(entries: Vec<AttrDesc>) -> GObjResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, desc) in entries.iter().enumerate() {
            if desc.name.is_empty() {
                return Err(GObjError::InvalidName(String::new()));
            }
            if index.insert(desc.name, pos).is_some() {
                return Err(GObjError::DuplicateName(desc.name.to_string()));
            }
            if let Some(default) = &desc.default {
                if !default.matches(desc.dtype) {
                    return Err(GObjError::TypeMismatch {
                        attr: desc.name.to_string(),
                        expected: desc.dtype,
                        actual: default.shape(),
                    });
                }
            }
        }
        Ok(AttrSchema { entries, index })
    }

    pub fn get(&self, name: &str) -> Option<&AttrDesc> {
        self.index.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &AttrDesc> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attribute values of one instance
#[derive(Debug, Clone)]
pub struct AttrStore {
    schema: Arc<AttrSchema>,
    /// Index-aligned with the schema; `None` means unset
    values: Vec<Option<AttrValue>>,
}

impl AttrStore {
    /// Build a table from the schema, applying defaults
    pub fn define(schema: Arc<AttrSchema>) -> Self {
        let values = schema.iter().map(AttrDesc::initial_value).collect();
        AttrStore { schema, values }
    }

    pub fn schema(&self) -> &Arc<AttrSchema> {
        &self.schema
    }

    pub fn has(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// Read a value.
    ///
    /// Fails with `UnknownAttribute` when the name is not in the schema and
    /// with `RequiredMissing` when a required attribute is still unset.
    pub fn read(&self, name: &str) -> GObjResult<&AttrValue> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| GObjError::UnknownAttribute(name.to_string()))?;
        match &self.values[pos] {
            Some(value) => Ok(value),
            None => Err(GObjError::RequiredMissing(name.to_string())),
        }
    }

    /// Read without error reporting
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.schema.position(name).and_then(|pos| self.values[pos].as_ref())
    }

    /// Write a value of exactly the declared type
    pub fn write(&mut self, name: &str, value: AttrValue) -> GObjResult<()> {
        let (pos, desc) = self.lookup(name)?;
        if !value.matches(desc.dtype) {
            return Err(GObjError::TypeMismatch {
                attr: name.to_string(),
                expected: desc.dtype,
                actual: value.shape(),
            });
        }
        self.values[pos] = Some(value);
        Ok(())
    }

    /// Write a JSON value, coercing it into the declared type
    pub fn write_json(&mut self, name: &str, value: &Value) -> GObjResult<()> {
        let (pos, desc) = self.lookup(name)?;
        let coerced = AttrValue::from_json(desc.dtype, value).ok_or_else(|| GObjError::TypeMismatch {
            attr: name.to_string(),
            expected: desc.dtype,
            actual: json_shape(value).to_string(),
        })?;
        self.values[pos] = Some(coerced);
        Ok(())
    }

    /// Merge a config map over the current values.
    ///
    /// All keys are validated before anything is written, so a failed merge
    /// leaves the store untouched. Unknown keys fail unless `ignore_unknown`.
    /// Returns the names written, in schema order.
    pub fn merge_json(&mut self, kw: &Kw, ignore_unknown: bool) -> GObjResult<Vec<&'static str>> {
        let mut staged: Vec<(usize, AttrValue)> = Vec::with_capacity(kw.len());
        for (key, value) in kw {
            let Some(pos) = self.schema.position(key) else {
                if ignore_unknown {
                    continue;
                }
                return Err(GObjError::UnknownAttribute(key.clone()));
            };
            staged.push((pos, self.coerce(pos, value)?));
        }
        staged.sort_by_key(|(pos, _)| *pos);
        let mut written = Vec::with_capacity(staged.len());
        for (pos, value) in staged {
            written.push(self.schema.entries[pos].name);
            self.values[pos] = Some(value);
        }
        Ok(written)
    }

    /// Required attributes that are still unset
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.schema
            .iter()
            .zip(&self.values)
            .filter(|(desc, value)| desc.flags.is_required() && value.is_none())
            .map(|(desc, _)| desc.name)
            .collect()
    }

    /// Snapshot of serializable attributes.
    ///
    /// With `persist_only` only `PERSIST` attributes are included. Unset
    /// values and pointers are skipped.
    pub fn save(&self, persist_only: bool) -> Kw {
        let mut kw = Kw::new();
        for (desc, value) in self.schema.iter().zip(&self.values) {
            if persist_only && !desc.flags.is_persistent() {
                continue;
            }
            if !desc.dtype.is_serializable() {
                continue;
            }
            if let Some(value) = value {
                kw.insert(desc.name.to_string(), value.to_json());
            }
        }
        kw
    }

    /// Restore persistent attributes from a saved snapshot.
    ///
    /// Keys that are unknown or not persistent are skipped with a warning.
    /// A value of the wrong shape fails the whole load and leaves the store
    /// untouched.
    pub fn load(&mut self, kw: &Kw) -> GObjResult<Vec<&'static str>> {
        let mut staged: Vec<(usize, AttrValue)> = Vec::with_capacity(kw.len());
        for (key, value) in kw {
            match self.schema.position(key) {
                Some(pos) if self.schema.entries[pos].flags.is_persistent() => {
                    staged.push((pos, self.coerce(pos, value)?));
                }
                Some(_) => warn!(attr = %key, "Attribute is not persistent, skipped"),
                None => warn!(attr = %key, "Saved attribute not in schema, skipped"),
            }
        }
        let mut loaded = Vec::with_capacity(staged.len());
        for (pos, value) in staged {
            loaded.push(self.schema.entries[pos].name);
            self.values[pos] = Some(value);
        }
        Ok(loaded)
    }

    /// JSON view of the attributes carrying any of `flags`; `NONE` selects all
    pub fn to_json(&self, flags: AttrFlags) -> Kw {
        let mut kw = Kw::new();
        for (desc, value) in self.schema.iter().zip(&self.values) {
            if !flags.is_empty() && !desc.flags.intersects(flags) {
                continue;
            }
            let json = value.as_ref().map_or(Value::Null, AttrValue::to_json);
            kw.insert(desc.name.to_string(), json);
        }
        kw
    }

    /// Put every attribute back to its schema default
    pub fn reset_defaults(&mut self) {
        for (desc, value) in self.schema.iter().zip(self.values.iter_mut()) {
            *value = desc.initial_value();
        }
    }

    /// Reset the `STATS`/`RSTATS` counters to zero
    pub fn reset_stats(&mut self) {
        let stats = AttrFlags::STATS | AttrFlags::RSTATS;
        for (desc, value) in self.schema.iter().zip(self.values.iter_mut()) {
            if desc.flags.intersects(stats) {
                *value = Some(desc.dtype.zero());
            }
        }
    }

    /// Iterate over `(descriptor, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&AttrDesc, Option<&AttrValue>)> {
        self.schema.iter().zip(self.values.iter().map(Option::as_ref))
    }

    fn coerce(&self, pos: usize, value: &Value) -> GObjResult<AttrValue> {
        let desc = &self.schema.entries[pos];
        AttrValue::from_json(desc.dtype, value).ok_or_else(|| GObjError::TypeMismatch {
            attr: desc.name.to_string(),
            expected: desc.dtype,
            actual: json_shape(value).to_string(),
        })
    }

    fn lookup(&self, name: &str) -> GObjResult<(usize, &AttrDesc)> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| GObjError::UnknownAttribute(name.to_string()))?;
        Ok((pos, &self.schema.entries[pos]))
    }
}

fn json_shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
