use std::collections::BTreeMap;
use std::fmt;

use mlua::{Lua, Table};

use crate::{Error, Result};

/// Conversion depth guard for nested tables.
pub(crate) const MAX_DEPTH: usize = 32;

/// Script value model independent of the Lua state it came from.
///
/// Values survive host forks: they carry no references into any Lua state,
/// so a snapshot taken from one state can be replayed into another.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Lua truthiness: `nil` and `false` are false, everything else is true.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_element(f, item)?;
                }
                f.write_str("]")
            }
            Value::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: ")?;
                    write_element(f, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

// Strings nested inside containers are quoted so `[a, b]` and `["a, b"]`
// stay distinguishable.
fn write_element(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(v) => write!(f, "\"{v}\""),
        other => write!(f, "{other}"),
    }
}

pub(crate) fn lua_to_value(value: mlua::Value, depth: usize) -> Result<Value> {
    if depth == 0 {
        return Err(Error::ValueTooDeep);
    }

    Ok(match value {
        mlua::Value::Nil => Value::Null,
        mlua::Value::Boolean(v) => Value::Bool(v),
        mlua::Value::Integer(v) => Value::Int(v),
        mlua::Value::Number(v) => Value::Float(v),
        mlua::Value::String(v) => Value::String(v.to_string_lossy().to_string()),
        mlua::Value::Table(table) => table_to_value(table, depth)?,
        // Functions, userdata, threads and the like have no portable
        // representation; they snapshot to nil.
        _ => Value::Null,
    })
}

fn table_to_value(table: Table, depth: usize) -> Result<Value> {
    let mut indexed: Vec<(i64, Value)> = Vec::new();
    let mut object: BTreeMap<String, Value> = BTreeMap::new();
    let mut only_positive_int_keys = true;

    for pair in table.pairs::<mlua::Value, mlua::Value>() {
        let (key, raw) = pair?;
        let item = lua_to_value(raw, depth - 1)?;

        match key {
            mlua::Value::Integer(i) if i >= 1 => {
                indexed.push((i, item.clone()));
                object.insert(i.to_string(), item);
            }
            mlua::Value::Integer(i) => {
                only_positive_int_keys = false;
                object.insert(i.to_string(), item);
            }
            mlua::Value::String(s) => {
                only_positive_int_keys = false;
                object.insert(s.to_string_lossy().to_string(), item);
            }
            // Exotic key types (bool, float, table) are dropped.
            _ => {
                only_positive_int_keys = false;
            }
        }
    }

    // A table keyed 1..=N converts to an array; everything else converts to
    // an object with stringified keys.
    if only_positive_int_keys && !indexed.is_empty() {
        indexed.sort_by_key(|(i, _)| *i);
        if indexed.last().map(|(i, _)| *i) == Some(indexed.len() as i64) {
            return Ok(Value::Array(indexed.into_iter().map(|(_, v)| v).collect()));
        }
    }

    Ok(Value::Object(object))
}

pub(crate) fn value_to_lua(lua: &Lua, value: &Value) -> mlua::Result<mlua::Value> {
    Ok(match value {
        Value::Null => mlua::Value::Nil,
        Value::Bool(v) => mlua::Value::Boolean(*v),
        Value::Int(v) => mlua::Value::Integer(*v),
        Value::Float(v) => mlua::Value::Number(*v),
        Value::String(v) => mlua::Value::String(lua.create_string(v)?),
        Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, value_to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Object(entries) => {
            let table = lua.create_table_with_capacity(0, entries.len())?;
            for (key, item) in entries {
                table.set(key.as_str(), value_to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
    })
}
