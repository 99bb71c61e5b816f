//! # Módulo de Limites de Execução
//!
//! Configuração do engine. Todos os campos têm valores padrão seguros e
//! podem ser sobrescritos por variáveis de ambiente.
//!
//! | Limite               | Variável                      | Padrão  |
//! |----------------------|-------------------------------|---------|
//! | max_parallel_files   | `RUNNER_MAX_PARALLEL`         | 10      |
//! | max_tests_per_file   | `RUNNER_MAX_TESTS`            | 500     |
//! | request_timeout      | `RUNNER_REQUEST_TIMEOUT_SECS` | 30s     |
//! | max_test_delay       | `RUNNER_MAX_TEST_DELAY_MS`    | 60000ms |
//!
//! Não existe timeout de run: um arquivo roda até terminar ou ser parado.
//! O único limite de tempo é o timeout de cada chamada HTTP.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arquivos executando ao mesmo tempo (tamanho do pool de workers).
pub const DEFAULT_MAX_PARALLEL_FILES: usize = 10;

/// Testes por arquivo. Acima disso o arquivo é rejeitado na validação.
pub const DEFAULT_MAX_TESTS_PER_FILE: usize = 500;

/// Timeout de cada chamada HTTP, em segundos.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delay máximo entre testes, em milissegundos.
pub const DEFAULT_MAX_TEST_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionLimits {
    /// Tamanho do pool de workers da fila. Zero é tratado como um.
    pub max_parallel_files: usize,

    pub max_tests_per_file: usize,

    /// Repassado ao transporte HTTP.
    pub request_timeout: Duration,

    /// Delays declarados maiores que isso são truncados.
    pub max_test_delay: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_parallel_files: DEFAULT_MAX_PARALLEL_FILES,
            max_tests_per_file: DEFAULT_MAX_TESTS_PER_FILE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_test_delay: Duration::from_millis(DEFAULT_MAX_TEST_DELAY_MS),
        }
    }
}

impl ExecutionLimits {
    /// Lê os limites do ambiente; valores ausentes ou inválidos ficam no padrão.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut limits = Self::default();

        if let Some(n) = lookup("RUNNER_MAX_PARALLEL").and_then(|v| v.parse().ok()) {
            limits.max_parallel_files = n;
        }

        if let Some(n) = lookup("RUNNER_MAX_TESTS").and_then(|v| v.parse().ok()) {
            limits.max_tests_per_file = n;
        }

        if let Some(n) = lookup("RUNNER_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            limits.request_timeout = Duration::from_secs(n);
        }

        if let Some(n) = lookup("RUNNER_MAX_TEST_DELAY_MS").and_then(|v| v.parse().ok()) {
            limits.max_test_delay = Duration::from_millis(n);
        }

        limits
    }

    /// Limites restritivos para testes.
    pub fn strict() -> Self {
        Self {
            max_parallel_files: 2,
            max_tests_per_file: 20,
            request_timeout: Duration::from_secs(5),
            max_test_delay: Duration::from_millis(500),
        }
    }

    /// Limites permissivos para desenvolvimento.
    pub fn relaxed() -> Self {
        Self {
            max_parallel_files: 50,
            max_tests_per_file: 5_000,
            request_timeout: Duration::from_secs(120),
            max_test_delay: Duration::from_secs(600),
        }
    }

    /// Permits do semáforo do pool.
    pub fn worker_permits(&self) -> usize {
        self.max_parallel_files.max(1)
    }

    /// Delay efetivo após um teste, já truncado.
    pub fn clamp_delay(&self, delay_ms: Option<u64>) -> Option<Duration> {
        match delay_ms {
            Some(ms) if ms > 0 => Some(Duration::from_millis(ms).min(self.max_test_delay)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_parallel_files, 10);
        assert_eq!(limits.max_tests_per_file, 500);
        assert_eq!(limits.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("RUNNER_MAX_PARALLEL", "3"),
            ("RUNNER_MAX_TESTS", "not-a-number"),
            ("RUNNER_REQUEST_TIMEOUT_SECS", "7"),
        ]
        .into_iter()
        .collect();

        let limits = ExecutionLimits::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(limits.max_parallel_files, 3);
        assert_eq!(limits.max_tests_per_file, DEFAULT_MAX_TESTS_PER_FILE);
        assert_eq!(limits.request_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_worker_permits_never_zero() {
        let limits = ExecutionLimits {
            max_parallel_files: 0,
            ..Default::default()
        };
        assert_eq!(limits.worker_permits(), 1);
    }

    #[test]
    fn test_clamp_delay() {
        let limits = ExecutionLimits::strict();
        assert_eq!(limits.clamp_delay(None), None);
        assert_eq!(limits.clamp_delay(Some(0)), None);
        assert_eq!(limits.clamp_delay(Some(100)), Some(Duration::from_millis(100)));
        assert_eq!(limits.clamp_delay(Some(10_000)), Some(Duration::from_millis(500)));
    }
}
