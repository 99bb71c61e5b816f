//! # Módulo de Captura - Variáveis Extraídas das Respostas HTTP
//!
//! Aplica as regras de captura de um teste sobre o body da resposta e
//! devolve novas variáveis para o `VariableStore`.
//!
//! ## Para todos entenderem:
//!
//! ```text
//! Teste 1: POST /login
//! Resposta: <input name="token" value="abc123">
//! Regra: name=token, pattern=value="(\w+)"
//! Resultado: Variable { name: "token", value: "abc123" }
//!
//! Teste 2: GET /profile?token={token}
//! URL final: /profile?token=abc123
//! ```
//!
//! ## Regras:
//!
//! - Só o **primeiro** match é usado, nunca concatenamos matches.
//! - Se a regex tem grupos, o valor é o texto do primeiro grupo.
//!   Sem grupos, o valor é o match inteiro.
//! - Sem match ou regex inválida: valor vazio, registrado no diagnóstico.
//!   Nunca aborta o run.
//! - A quantidade de variáveis devolvidas é sempre igual à de regras.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ErrorCode;
use crate::protocol::{CapturedVariableRule, Variable};

// ============================================================================
// RESULTADO DE CAPTURA
// ============================================================================

/// Diagnóstico de uma regra de captura.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureOutcome {
    /// Nome da variável de destino.
    pub name: String,

    /// Regex declarada.
    pub pattern: String,

    /// Valor capturado, vazio se não houve match.
    pub value: String,

    /// Se a regex encontrou match.
    pub matched: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CaptureOutcome {
    fn matched(rule: &CapturedVariableRule, value: &str) -> Self {
        Self {
            name: rule.name.clone(),
            pattern: rule.pattern.clone(),
            value: value.to_string(),
            matched: true,
            error: None,
            error_code: None,
        }
    }

    fn failed(rule: &CapturedVariableRule, error: String, code: ErrorCode) -> Self {
        Self {
            name: rule.name.clone(),
            pattern: rule.pattern.clone(),
            value: String::new(),
            matched: false,
            error: Some(error),
            error_code: Some(code.formatted()),
        }
    }

    /// Converte em variável no ambiente do run.
    pub fn into_variable(self, environment: &str) -> Variable {
        Variable::new(self.name, self.value, environment)
    }
}

// ============================================================================
// MOTOR DE CAPTURA
// ============================================================================

/// Avalia cada regra contra o body, devolvendo um diagnóstico por regra.
pub fn capture(rules: &[CapturedVariableRule], body: &str) -> Vec<CaptureOutcome> {
    rules.iter().map(|rule| capture_single(rule, body)).collect()
}

/// Variáveis capturadas, já marcadas com o ambiente do run.
///
/// O chamador é responsável por passá-las ao `VariableStore::add_or_update_batch`.
pub fn match_variables(rules: &[CapturedVariableRule], body: &str, environment: &str) -> Vec<Variable> {
    capture(rules, body)
        .into_iter()
        .map(|outcome| outcome.into_variable(environment))
        .collect()
}

fn capture_single(rule: &CapturedVariableRule, body: &str) -> CaptureOutcome {
    let re = match Regex::new(&rule.pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(name = %rule.name, pattern = %rule.pattern, error = %e, "Regex de captura inválida");
            return CaptureOutcome::failed(
                rule,
                format!("Regex inválida '{}': {}", rule.pattern, e),
                ErrorCode::CAPTURE_INVALID_REGEX,
            );
        }
    };

    match re.captures(body) {
        Some(caps) => {
            // Primeiro grupo se existir, senão o match completo.
            let value = if re.captures_len() > 1 {
                caps.get(1).map(|m| m.as_str()).unwrap_or("")
            } else {
                caps.get(0).map(|m| m.as_str()).unwrap_or("")
            };
            CaptureOutcome::matched(rule, value)
        }
        None => {
            warn!(name = %rule.name, pattern = %rule.pattern, "Captura sem match no body");
            CaptureOutcome::failed(
                rule,
                format!("Padrão '{}' não encontrou match no body.", rule.pattern),
                ErrorCode::CAPTURE_NO_MATCH,
            )
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(variables: &'a [Variable], name: &str) -> &'a str {
        variables
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .map(|v| v.value.as_str())
            .unwrap_or("")
    }

    #[test]
    fn test_match_variables_uses_first_group() {
        let rules = vec![
            CapturedVariableRule::new("var1", r"(\d+)"),
            CapturedVariableRule::new("varFoo", r"(<html.+?>)"),
        ];
        let content = "<html class='bootstrap'><p>Tap tap tap 123</p></html>";

        let variables = match_variables(&rules, content, "DEV");

        assert_eq!(variables.len(), 2);
        assert_eq!(value_of(&variables, "var1"), "123");
        assert_eq!(value_of(&variables, "varFoo"), "<html class='bootstrap'>");
        assert!(variables.iter().all(|v| v.environment == "DEV"));
    }

    #[test]
    fn test_no_match_yields_empty_value() {
        let rules = vec![
            CapturedVariableRule::new("var1", "foo"),
            CapturedVariableRule::new("var2", "bar"),
        ];

        let variables = match_variables(&rules, "<html>123 abc</html>", "DEV");

        assert_eq!(variables.len(), 2);
        assert_eq!(value_of(&variables, "var1"), "");
        assert_eq!(value_of(&variables, "var2"), "");
    }

    #[test]
    fn test_invalid_regex_yields_empty_value_without_aborting() {
        let rules = vec![
            CapturedVariableRule::new("var1", r"(\d+)"),
            CapturedVariableRule::new("var2", r"(() this is a bad regex?("),
        ];

        let outcomes = capture(&rules, "<html>123 abc</html>");

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].value, "123");
        assert!(outcomes[0].matched);
        assert_eq!(outcomes[1].value, "");
        assert!(!outcomes[1].matched);
        assert_eq!(outcomes[1].error_code.as_deref(), Some("E3010"));
    }

    #[test]
    fn test_multiple_matches_are_not_concatenated() {
        let rules = vec![CapturedVariableRule::new("var1", r"(\d+)")];
        let content = "<html>The number 3 and the number 4 combined make 7</html>";

        let variables = match_variables(&rules, content, "DEV");

        assert_eq!(value_of(&variables, "var1"), "3");
    }

    #[test]
    fn test_pattern_without_group_uses_whole_match() {
        let rules = vec![CapturedVariableRule::new("word", r"ab+c")];
        let variables = match_variables(&rules, "xx abbbc yy", "");
        assert_eq!(value_of(&variables, "word"), "abbbc");
    }

    #[test]
    fn test_no_match_records_error_code() {
        let rules = vec![CapturedVariableRule::new("token", r#"token="(\w+)""#)];
        let outcomes = capture(&rules, "nothing here");
        assert_eq!(outcomes[0].error_code.as_deref(), Some("E3011"));
        assert!(outcomes[0].error.as_ref().unwrap().contains("não encontrou"));
    }

    #[test]
    fn test_empty_rules_yield_empty_output() {
        assert!(match_variables(&[], "body", "DEV").is_empty());
    }
}
