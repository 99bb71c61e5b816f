//! # Módulo de Validação - Checagem do Arquivo Antes do Run
//!
//! Valida a estrutura de um `TestFile` **antes** de qualquer chamada HTTP.
//! Um arquivo malformado falha inteiro e de imediato, em vez de falhar
//! no meio da sequência com metade dos testes já executados.
//!
//! ## Validações realizadas:
//!
//! 1. Quantidade de testes dentro de `max_tests_per_file`
//! 2. Cada teste tem URL
//! 3. Método HTTP é um token válido
//! 4. Posições não se repetem
//! 5. Variáveis declaradas têm nome
//!
//! Todos os erros são coletados, não paramos no primeiro.

use std::collections::HashSet;

use reqwest::Method;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::limits::ExecutionLimits;
use crate::protocol::{Test, TestFile};

/// Problema encontrado em uma declaração de teste.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionIssue {
    #[error("Teste na posição {position}: URL ausente")]
    MissingUrl { position: usize },

    #[error("Teste na posição {position}: método HTTP '{method}' inválido")]
    InvalidHttpMethod { position: usize, method: String },

    #[error("Posição {position} declarada mais de uma vez")]
    DuplicatePosition { position: usize },

    #[error("Arquivo tem {count} testes, limite é {max}")]
    TooManyTests { count: usize, max: usize },

    #[error("Variável #{index} declarada sem nome")]
    EmptyVariableName { index: usize },
}

impl DefinitionIssue {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingUrl { .. } => ErrorCode::MISSING_URL,
            Self::InvalidHttpMethod { .. } => ErrorCode::INVALID_HTTP_METHOD,
            Self::DuplicatePosition { .. } => ErrorCode::DUPLICATE_POSITION,
            Self::TooManyTests { .. } => ErrorCode::TOO_MANY_TESTS,
            Self::EmptyVariableName { .. } => ErrorCode::EMPTY_VARIABLE_NAME,
        }
    }
}

/// Arquivo rejeitado antes de começar. Único erro fatal para um run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Arquivo '{file_name}' inválido: {}", render_issues(.issues))]
pub struct DefinitionError {
    pub file_name: String,
    pub issues: Vec<DefinitionIssue>,
}

fn render_issues(issues: &[DefinitionIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("[{}] {}", issue.code(), issue))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Valida um arquivo de teste completo.
pub fn validate_test_file(file: &TestFile, limits: &ExecutionLimits) -> Result<(), DefinitionError> {
    let mut issues = Vec::new();

    if file.tests.len() > limits.max_tests_per_file {
        issues.push(DefinitionIssue::TooManyTests {
            count: file.tests.len(),
            max: limits.max_tests_per_file,
        });
    }

    for (index, variable) in file.variables.iter().enumerate() {
        if variable.name.trim().is_empty() {
            issues.push(DefinitionIssue::EmptyVariableName { index });
        }
    }

    let mut seen = HashSet::new();
    for test in &file.tests {
        if !seen.insert(test.position) {
            issues.push(DefinitionIssue::DuplicatePosition { position: test.position });
        }
        validate_test(test, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(DefinitionError {
            file_name: file.file_name.clone(),
            issues,
        })
    }
}

fn validate_test(test: &Test, issues: &mut Vec<DefinitionIssue>) {
    if test.url.trim().is_empty() {
        issues.push(DefinitionIssue::MissingUrl { position: test.position });
    }

    // Aceita qualquer token HTTP válido (GET, post, PROPFIND...).
    if test.method.trim().is_empty() || Method::from_bytes(test.method.trim().as_bytes()).is_err() {
        issues.push(DefinitionIssue::InvalidHttpMethod {
            position: test.position,
            method: test.method.clone(),
        });
    }
}
