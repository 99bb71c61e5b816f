// Module: Context
// Per-run variable state: environment precedence, token substitution, secrets.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::protocol::Variable;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([^{}]+)\}").expect("valid token regex")
});

/// Decrypts variable values that are stored encrypted at rest.
pub trait VariableEncryptor: Send + Sync {
    fn decrypt(&self, value: &str) -> String;
}

/// Identity encryptor, used when values are stored in plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextEncryptor;

impl VariableEncryptor for PlainTextEncryptor {
    fn decrypt(&self, value: &str) -> String {
        value.to_string()
    }
}

/// Whether a binding came from a default declaration or from the session environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
    Default,
    Specific,
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: String,
    specificity: Specificity,
    /// Declared values may be encrypted at rest; captured values never are.
    encrypted: bool,
}

/// Holds the variables of one file run.
///
/// Lookups are case-insensitive. The session environment is fixed at creation.
pub struct VariableStore {
    environment: String,
    bindings: BTreeMap<String, Binding>,
    encryptor: Arc<dyn VariableEncryptor>,
}

impl VariableStore {
    pub fn new(environment: impl Into<String>, encryptor: Arc<dyn VariableEncryptor>) -> Self {
        Self {
            environment: environment.into(),
            bindings: BTreeMap::new(),
            encryptor,
        }
    }

    /// Store without encryption, mostly for tests and ad-hoc runs.
    pub fn plain(environment: impl Into<String>) -> Self {
        Self::new(environment, Arc::new(PlainTextEncryptor))
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Applies the environment precedence rule. Returns whether the value was accepted.
    ///
    /// - session environment: always accepted, binding becomes specific
    /// - default (empty): accepted only over nothing or over another default
    /// - any other environment: rejected
    pub fn add_or_update(&mut self, variable: &Variable) -> bool {
        self.bind(variable, true)
    }

    fn bind(&mut self, variable: &Variable, encrypted: bool) -> bool {
        let key = variable.name.to_lowercase();

        let specificity = if variable.environment == self.environment {
            Specificity::Specific
        } else if variable.is_default() {
            match self.bindings.get(&key) {
                Some(existing) if existing.specificity == Specificity::Specific => {
                    debug!(name = %variable.name, "Default value ignored, a specific value is bound");
                    return false;
                }
                _ => Specificity::Default,
            }
        } else {
            debug!(
                name = %variable.name,
                environment = %variable.environment,
                session = %self.environment,
                "Variable rejected: different environment"
            );
            return false;
        };

        self.bindings.insert(
            key,
            Binding {
                name: variable.name.clone(),
                value: variable.value.clone(),
                specificity,
                encrypted,
            },
        );
        true
    }

    /// Applies `add_or_update` in order.
    pub fn add_or_update_batch<'a, I>(&mut self, variables: I)
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        for variable in variables {
            self.add_or_update(variable);
        }
    }

    /// Same precedence rule as `add_or_update_batch`, for values read from a
    /// response. They are plain text and are never passed to the encryptor.
    pub fn add_captured_batch<'a, I>(&mut self, variables: I)
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        for variable in variables {
            self.bind(variable, false);
        }
    }

    /// Stored value (not decrypted), or empty string if unbound.
    pub fn get(&self, name: &str) -> String {
        self.bindings
            .get(&name.to_lowercase())
            .map(|b| b.value.clone())
            .unwrap_or_default()
    }

    pub fn specificity(&self, name: &str) -> Option<Specificity> {
        self.bindings.get(&name.to_lowercase()).map(|b| b.specificity)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Replaces every `{name}` token of a bound variable with its value,
    /// decrypting declared values.
    /// Tokens naming unbound variables are left untouched.
    pub fn substitute_plain(&self, text: &str) -> String {
        self.substitute(text, |value| value)
    }

    /// Same as `substitute_plain`, but values are regex-escaped so the
    /// result can be compiled as a pattern and match them literally.
    pub fn substitute_for_pattern(&self, text: &str) -> String {
        self.substitute(text, |value| regex::escape(&value))
    }

    fn substitute<F>(&self, text: &str, transform: F) -> String
    where
        F: Fn(String) -> String,
    {
        TOKEN_RE
            .replace_all(text, |caps: &Captures| {
                match self.bindings.get(&caps[1].to_lowercase()) {
                    Some(binding) if binding.encrypted => transform(self.encryptor.decrypt(&binding.value)),
                    Some(binding) => transform(binding.value.clone()),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Names of `{tokens}` in `text` that no binding resolves.
    pub fn unresolved_tokens(&self, text: &str) -> Vec<String> {
        TOKEN_RE
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .filter(|name| !self.bindings.contains_key(&name.to_lowercase()))
            .collect()
    }

    /// Logs the current bindings. Values are logged as stored, never decrypted.
    pub fn dump(&self) {
        debug!(environment = %self.environment, count = self.bindings.len(), "Variable store contents");
        for binding in self.bindings.values() {
            debug!(
                name = %binding.name,
                value = %binding.value,
                specificity = ?binding.specificity,
                encrypted = binding.encrypted,
                " - variable"
            );
        }
    }
}
