use std::collections::HashMap;

use string_interner::{DefaultStringInterner, DefaultSymbol};

use crate::{ir::is_temp, value::Value};

/// The engine's variable store.
///
/// User variables and compiler temporaries live in separate maps keyed by
/// interned names. Lookups try user variables first, then temporaries. There
/// is no scoping: a name stays bound until the store is dropped.
#[derive(Debug, Default)]
pub struct Vars {
    names: DefaultStringInterner,
    user: HashMap<DefaultSymbol, Value>,
    temps: HashMap<DefaultSymbol, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let sym = self.names.get(name)?;
        self.user.get(&sym).or_else(|| self.temps.get(&sym))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Binds `name`, choosing the namespace from its prefix.
    pub fn set(&mut self, name: &str, value: Value) {
        let sym = self.names.get_or_intern(name);
        if is_temp(name) {
            self.temps.insert(sym, value);
        } else {
            self.user.insert(sym, value);
        }
    }

    /// User variables sorted by name.
    pub fn user_vars(&self) -> Vec<(&str, &Value)> {
        let mut vars: Vec<_> = self
            .user
            .iter()
            .filter_map(|(&sym, value)| Some((self.names.resolve(sym)?, value)))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(b.0));
        vars
    }

    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_usage() {
        let mut vars = Vars::new();
        assert_eq!(vars.get("a"), None);
        vars.set("a", Value::Int(1));
        vars.set("$t0", Value::Bool(true));
        assert_eq!(vars.get("a"), Some(&Value::Int(1)));
        assert_eq!(vars.get("$t0"), Some(&Value::Bool(true)));
        assert_eq!(vars.temp_count(), 1);
        vars.set("a", Value::Str("x".to_string()));
        assert_eq!(vars.get("a"), Some(&Value::Str("x".to_string())));
    }

    #[test]
    fn temps_stay_out_of_user_vars() {
        let mut vars = Vars::new();
        vars.set("b", Value::Int(2));
        vars.set("$t3", Value::Int(9));
        vars.set("a", Value::Int(1));
        let names: Vec<&str> = vars.user_vars().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(vars.contains("$t3"));
    }
}
