//! Bound `name -> string` maps and `$name` interpolation (spec §3).
//!
//! Two maps exist at runtime: `inputs` (bound once at start) and `outputs`
//! (appended as each goal completes). Resolution order is inputs first, then
//! outputs, matching the invariant in spec §3.

use std::collections::BTreeMap;

use crate::domain::error::Degradation;

/// An ordered, append-friendly `name -> string` map.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VariableMap(BTreeMap<String, String>);

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve every `$name` reference in `template` against `inputs` first,
/// then `outputs`. Unresolved references are left verbatim and reported
/// through `on_unresolved` rather than failing (spec §7).
pub fn interpolate(
    template: &str,
    inputs: &VariableMap,
    outputs: &VariableMap,
    mut on_unresolved: impl FnMut(Degradation),
) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(dollar_pos) = rest.find('$') {
        result.push_str(&rest[..dollar_pos]);
        let after = &rest[dollar_pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len == 0 {
            result.push('$');
            rest = after;
            continue;
        }
        let name = &after[..name_len];
        if let Some(v) = inputs.get(name).or_else(|| outputs.get(name)) {
            result.push_str(v);
        } else {
            on_unresolved(Degradation::UnresolvedVariable(name.to_string()));
            result.push('$');
            result.push_str(name);
        }
        rest = &after[name_len..];
    }
    result.push_str(rest);
    result
}
