//! SQL fragments with parameter placeholders.
//!
//! Builders never write parameter names themselves. They bind a value under a
//! base name and get back a [`Slot`]; [`Sql::render`] walks the fragment once and
//! asks the [`ParameterNamespace`] for the final name the first time each slot is
//! reached. A slot referenced twice renders the same name twice.

use crate::params::{CompiledQuery, ParamValue, ParameterNamespace};
use std::collections::BTreeMap;

/// Prefix for warehouse table names; substituted downstream, never here.
pub const TABLE_PREFIX: &str = "${projectId}.${dataSetId}";

/// Backtick-quoted, placeholder-prefixed table name.
pub fn table(name: &str) -> String {
    format!("`{}.{}`", TABLE_PREFIX, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Param(usize),
}

#[derive(Debug, Clone)]
struct Binding {
    base: String,
    value: ParamValue,
}

#[derive(Debug, Clone, Default)]
pub struct Sql {
    pieces: Vec<Piece>,
    bindings: Vec<Binding>,
}

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut sql = Self::new();
        sql.push_str(&text.into());
        sql
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn push_str(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        match self.pieces.last_mut() {
            Some(Piece::Text(last)) => last.push_str(text),
            _ => self.pieces.push(Piece::Text(text.to_string())),
        }
        self
    }

    /// Register a value without referencing it yet.
    pub fn bind(&mut self, base: &str, value: ParamValue) -> Slot {
        self.bindings.push(Binding {
            base: base.to_string(),
            value,
        });
        Slot(self.bindings.len() - 1)
    }

    /// Reference a bound slot as `@name`.
    pub fn push_slot(&mut self, slot: Slot) -> &mut Self {
        self.pieces.push(Piece::Param(slot.0));
        self
    }

    pub fn push_param(&mut self, base: &str, value: ParamValue) -> &mut Self {
        let slot = self.bind(base, value);
        self.push_slot(slot)
    }

    /// Move `other` onto the end of this fragment, keeping its slots distinct.
    pub fn append(&mut self, other: Sql) -> &mut Self {
        let offset = self.bindings.len();
        self.bindings.extend(other.bindings);
        for piece in other.pieces {
            match piece {
                Piece::Text(text) => {
                    self.push_str(&text);
                }
                Piece::Param(idx) => self.pieces.push(Piece::Param(idx + offset)),
            }
        }
        self
    }

    pub fn join(parts: Vec<Sql>, separator: &str) -> Sql {
        let mut out = Sql::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            out.append(part);
        }
        out
    }

    /// `prefix` + self + `suffix`
    pub fn wrap(self, prefix: &str, suffix: &str) -> Sql {
        let mut out = Sql::text(prefix);
        out.append(self);
        out.push_str(suffix);
        out
    }

    /// Assign parameter names in traversal order and produce the final query.
    pub fn render(&self, namespace: &mut ParameterNamespace) -> CompiledQuery {
        let mut names: Vec<Option<String>> = vec![None; self.bindings.len()];
        let mut parameters = BTreeMap::new();
        let mut sql = String::new();

        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Param(idx) => {
                    let name = match &names[*idx] {
                        Some(name) => name.clone(),
                        None => {
                            let binding = &self.bindings[*idx];
                            let name = namespace.fresh(&binding.base);
                            parameters.insert(name.clone(), binding.value.clone());
                            names[*idx] = Some(name.clone());
                            name
                        }
                    };
                    sql.push('@');
                    sql.push_str(&name);
                }
            }
        }

        CompiledQuery::new(sql, parameters)
    }
}
