use std::collections::HashSet;

use mlua::Lua;

use crate::Result;
use crate::value::{MAX_DEPTH, Value, lua_to_value, value_to_lua};

/// Embedded script evaluator with a mutable global binding table.
///
/// Each host owns an independent Lua state. Steps bind variables with
/// [`ScriptHost::set`] and evaluate fragments with [`ScriptHost::eval`];
/// parallel workers receive a [`ScriptHost::fork`], which deep-copies the
/// user-visible bindings so workers never share evaluator state.
pub struct ScriptHost {
    lua: Lua,
    /// Global names present in a fresh state (the standard library).
    /// Anything outside this set is a user binding and travels on fork.
    baseline: HashSet<String>,
}

impl ScriptHost {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();

        let mut baseline = HashSet::new();
        for pair in lua.globals().pairs::<mlua::Value, mlua::Value>() {
            let (key, _) = pair?;
            if let mlua::Value::String(name) = key {
                baseline.insert(name.to_string_lossy().to_string());
            }
        }

        Ok(Self { lua, baseline })
    }

    /// Bind `value` as a global.
    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        let lua_value = value_to_lua(&self.lua, value)?;
        self.lua.globals().set(name, lua_value)?;
        Ok(())
    }

    /// Read a global back out as a neutral value.
    pub fn get(&self, name: &str) -> Result<Value> {
        let value: mlua::Value = self.lua.globals().get(name)?;
        lua_to_value(value, MAX_DEPTH)
    }

    /// Evaluate a script fragment and return its result.
    ///
    /// The fragment is evaluated as an expression where possible
    /// (`counter < 3`), otherwise executed as a statement block
    /// (`total = (total or 0) + 1`), in which case the result is nil.
    pub fn eval(&self, source: &str) -> Result<Value> {
        let value: mlua::Value = self.lua.load(source).set_name("script").eval()?;
        lua_to_value(value, MAX_DEPTH)
    }

    /// Create an independent host seeded with a snapshot of this host's
    /// user bindings.
    ///
    /// Mutations on either side never become visible on the other.
    /// Bindings that have no portable representation (functions, userdata)
    /// snapshot to nil.
    pub fn fork(&self) -> Result<Self> {
        let fork = Self::new()?;

        for pair in self.lua.globals().pairs::<mlua::Value, mlua::Value>() {
            let (key, raw) = pair?;
            let mlua::Value::String(key) = key else {
                continue;
            };
            let name = key.to_string_lossy().to_string();
            if self.baseline.contains(&name) {
                continue;
            }

            let snapshot = lua_to_value(raw, MAX_DEPTH)?;
            fork.set(&name, &snapshot)?;
        }

        Ok(fork)
    }
}
