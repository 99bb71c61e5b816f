//! # Módulo de Assertions - Verificação do Body da Resposta
//!
//! Cada assertion é uma combinação fechada de método × polaridade:
//!
//! |            | Positive            | Negative               |
//! |------------|---------------------|------------------------|
//! | `Regex`    | regex deve casar    | regex não pode casar   |
//! | `Selector` | seletor acha nó     | seletor não acha nó    |
//!
//! Padrões regex passam por `substitute_for_pattern` antes de compilar,
//! então valores de variáveis são sempre tratados como texto literal.
//! Seletores CSS usam `substitute_plain`.
//!
//! Padrão inválido nunca derruba o run: é tratado como "sem match" (uma
//! positive falha, uma negative passa), o erro é logado e fica registrado
//! em `AssertionResult.error`.

use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use crate::context::VariableStore;
use crate::errors::ErrorCode;
use crate::protocol::{Assertion, AssertionMethod, AssertionResult, AssertionType};

/// Resultado bruto da busca, antes de aplicar a polaridade.
enum Search {
    Found(bool),
    Invalid(String, ErrorCode),
}

/// Avalia uma assertion declarada contra o body da resposta.
pub fn evaluate(assertion: &Assertion, body: &str, variables: &VariableStore) -> AssertionResult {
    let transformed = match assertion.method {
        AssertionMethod::Regex => variables.substitute_for_pattern(&assertion.pattern),
        AssertionMethod::Selector => variables.substitute_plain(&assertion.pattern),
    };

    let search = match assertion.method {
        AssertionMethod::Regex => search_regex(&transformed, body),
        AssertionMethod::Selector => search_selector(&transformed, body),
    };

    // Padrão inválido conta como "sem match"; a polaridade decide o resto.
    let (found, error, error_code) = match search {
        Search::Found(found) => (found, None, None),
        Search::Invalid(message, code) => {
            warn!(
                description = %assertion.description,
                pattern = %transformed,
                error = %message,
                "Padrão de assertion inválido"
            );
            (false, Some(message), Some(code.formatted()))
        }
    };

    let success = match assertion.assertion_type {
        AssertionType::Positive => found,
        AssertionType::Negative => !found,
    };

    AssertionResult {
        description: assertion.description.clone(),
        pattern: assertion.pattern.clone(),
        transformed_pattern: transformed,
        assertion_type: assertion.assertion_type,
        method: assertion.method,
        success,
        error,
        error_code,
    }
}

/// Avalia todas as assertions de um teste, na ordem declarada.
pub fn evaluate_all(assertions: &[Assertion], body: &str, variables: &VariableStore) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|assertion| evaluate(assertion, body, variables))
        .collect()
}

/// `true` para lista vazia; senão, `true` só se todas passaram.
pub fn assertions_success(results: &[AssertionResult]) -> bool {
    results.iter().all(|r| r.success)
}

fn search_regex(pattern: &str, body: &str) -> Search {
    match Regex::new(pattern) {
        Ok(re) => Search::Found(re.is_match(body)),
        Err(e) => Search::Invalid(
            format!("Regex inválida '{}': {}", pattern, e),
            ErrorCode::ASSERTION_INVALID_REGEX,
        ),
    }
}

fn search_selector(selector: &str, body: &str) -> Search {
    let parsed = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            return Search::Invalid(
                format!("Seletor inválido '{}': {:?}", selector, e),
                ErrorCode::ASSERTION_INVALID_SELECTOR,
            )
        }
    };

    let document = Html::parse_document(body);
    let found = document.select(&parsed).next().is_some();
    Search::Found(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Variable;

    const PAGE: &str = r#"<html><body>
        <div id="welcome" class="banner">Welcome Bob</div>
        <ul><li class="item">1</li><li class="item">2</li></ul>
    </body></html>"#;

    fn regex(pattern: &str, assertion_type: AssertionType) -> Assertion {
        Assertion::new("desc", pattern, assertion_type, AssertionMethod::Regex)
    }

    fn selector(pattern: &str, assertion_type: AssertionType) -> Assertion {
        Assertion::new("desc", pattern, assertion_type, AssertionMethod::Selector)
    }

    #[test]
    fn test_positive_regex_matches() {
        let store = VariableStore::plain("DEV");
        let result = evaluate(&regex(r"Welcome \w+", AssertionType::Positive), PAGE, &store);
        assert!(result.success);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_positive_regex_without_match_fails() {
        let store = VariableStore::plain("DEV");
        let result = evaluate(&regex("Goodbye", AssertionType::Positive), PAGE, &store);
        assert!(!result.success);
    }

    #[test]
    fn test_negative_regex_inverts() {
        let store = VariableStore::plain("DEV");
        assert!(evaluate(&regex("Exception", AssertionType::Negative), PAGE, &store).success);
        assert!(!evaluate(&regex("Welcome", AssertionType::Negative), PAGE, &store).success);
    }

    #[test]
    fn test_regex_pattern_uses_escaped_variables() {
        let mut store = VariableStore::plain("DEV");
        store.add_or_update(&Variable::new("price", "$5.00", "DEV"));

        let result = evaluate(&regex("costs {price}", AssertionType::Positive), "it costs $5.00", &store);
        assert!(result.success);
        assert_eq!(result.transformed_pattern, r"costs \$5\.00");

        let result = evaluate(&regex("costs {price}", AssertionType::Positive), "it costs X5a00", &store);
        assert!(!result.success);
    }

    #[test]
    fn test_invalid_regex_counts_as_no_match() {
        let store = VariableStore::plain("DEV");

        let positive = evaluate(&regex("(unclosed", AssertionType::Positive), PAGE, &store);
        assert!(!positive.success);
        assert_eq!(positive.error_code.as_deref(), Some("E3020"));

        let negative = evaluate(&regex("(unclosed", AssertionType::Negative), PAGE, &store);
        assert!(negative.success);
        assert!(negative.error.is_some());
        assert_eq!(negative.error_code.as_deref(), Some("E3020"));
    }

    #[test]
    fn test_selector_positive_and_negative() {
        let store = VariableStore::plain("DEV");
        assert!(evaluate(&selector("div#welcome.banner", AssertionType::Positive), PAGE, &store).success);
        assert!(evaluate(&selector("li.item", AssertionType::Positive), PAGE, &store).success);
        assert!(!evaluate(&selector("table", AssertionType::Positive), PAGE, &store).success);
        assert!(evaluate(&selector("table", AssertionType::Negative), PAGE, &store).success);
        assert!(!evaluate(&selector("ul > li", AssertionType::Negative), PAGE, &store).success);
    }

    #[test]
    fn test_selector_substitutes_variables() {
        let mut store = VariableStore::plain("DEV");
        store.add_or_update(&Variable::new("block", "welcome", "DEV"));
        let result = evaluate(&selector("#{block}", AssertionType::Positive), PAGE, &store);
        assert!(result.success);
        assert_eq!(result.transformed_pattern, "#welcome");
    }

    #[test]
    fn test_invalid_selector_counts_as_no_match() {
        let store = VariableStore::plain("DEV");

        let positive = evaluate(&selector("div[[", AssertionType::Positive), PAGE, &store);
        assert!(!positive.success);
        assert_eq!(positive.error_code.as_deref(), Some("E3021"));

        let negative = evaluate(&selector("div[[", AssertionType::Negative), PAGE, &store);
        assert!(negative.success);
        assert_eq!(negative.error_code.as_deref(), Some("E3021"));
    }

    #[test]
    fn test_aggregation() {
        let store = VariableStore::plain("DEV");
        assert!(assertions_success(&[]));

        let failed_positive = evaluate_all(&[regex("missing", AssertionType::Positive)], PAGE, &store);
        assert!(!assertions_success(&failed_positive));

        let failed_negative = evaluate_all(&[regex("Welcome", AssertionType::Negative)], PAGE, &store);
        assert!(!assertions_success(&failed_negative));

        let all_ok = evaluate_all(
            &[
                regex("Welcome", AssertionType::Positive),
                selector("table", AssertionType::Negative),
            ],
            PAGE,
            &store,
        );
        assert!(assertions_success(&all_ok));
    }
}
