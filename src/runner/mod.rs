//! # Módulo Runner - Execução Sequencial de um Arquivo de Teste
//!
//! Executa os testes de **um** arquivo, estritamente em ordem de `position`.
//! Variáveis capturadas no teste *n* ficam visíveis para o teste *n+1*,
//! por isso não existe paralelismo dentro de um arquivo.
//!
//! ## Fluxo por teste:
//!
//! ```text
//! [stop pedido?] ──sim──> Stopped
//!       │ não
//!       v
//! substitui {vars} em url, headers, body (sem escape de regex)
//!       │
//!       v
//! transporte HTTP ──erro──> TestResult falho com a mensagem, segue adiante
//!       │ ok
//!       v
//! captura variáveis ──> VariableStore
//!       │
//!       v
//! assertions ──> TestResult ──> listener (current_index + 1)
//!       │
//!       v
//! delay declarado (único ponto de espera deliberado)
//! ```
//!
//! ## Falhas:
//!
//! - Arquivo malformado: `Err(DefinitionError)` antes da primeira chamada.
//! - Erro de transporte: vira resultado falho, o run continua. As capturas
//!   declaradas no teste ficam vazias.
//! - Regex/seletor inválido: a regra falha, o run continua.
//!
//! O cancelamento é cooperativo: verificado antes de cada teste e durante o
//! delay, nunca no meio de uma chamada HTTP.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::assertions;
use crate::context::{PlainTextEncryptor, VariableEncryptor, VariableStore};
use crate::errors::ErrorCode;
use crate::extractors;
use crate::limits::ExecutionLimits;
use crate::protocol::{HeaderItem, Test, TestFile, TestFileResult, TestResult, Variable};
use crate::transport::{HttpRequest, HttpTransport};
use crate::validation::{validate_test_file, DefinitionError};

// ============================================================================
// LISTENER DE PROGRESSO
// ============================================================================

/// Recebe cada resultado assim que o teste termina.
///
/// `index` é a posição do teste na ordem de execução (0, 1, 2...), não a
/// `position` declarada.
#[async_trait]
pub trait RunListener: Send + Sync {
    async fn on_test_completed(&self, index: usize, result: &TestResult);
}

/// Listener que ignora tudo, para runs ad-hoc.
pub struct NoopListener;

#[async_trait]
impl RunListener for NoopListener {
    async fn on_test_completed(&self, _index: usize, _result: &TestResult) {}
}

// ============================================================================
// RESULTADO DO RUN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Todos os testes foram executados.
    Completed,
    /// Stop observado antes do fim.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    /// Para runs parados, contém só os testes executados.
    pub result: TestFileResult,
}

// ============================================================================
// RUNNER
// ============================================================================

/// Executa arquivos de teste usando um transporte injetado.
///
/// Não guarda estado entre runs: cada chamada a `run` cria seu próprio
/// `VariableStore`, então um mesmo runner pode ser compartilhado por vários
/// workers.
pub struct TestFileRunner {
    transport: Arc<dyn HttpTransport>,
    encryptor: Arc<dyn VariableEncryptor>,
    limits: ExecutionLimits,
}

impl TestFileRunner {
    pub fn new(transport: Arc<dyn HttpTransport>, limits: ExecutionLimits) -> Self {
        Self {
            transport,
            encryptor: Arc::new(PlainTextEncryptor),
            limits,
        }
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn VariableEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn validate(&self, file: &TestFile) -> Result<(), DefinitionError> {
        validate_test_file(file, &self.limits)
    }

    /// Executa o arquivo inteiro no ambiente `environment`.
    #[instrument(name = "file_run", skip_all, fields(file = %file.file_name, environment = %environment))]
    pub async fn run(
        &self,
        file: &TestFile,
        environment: &str,
        stop: &CancellationToken,
        listener: &dyn RunListener,
    ) -> Result<RunOutcome, DefinitionError> {
        self.validate(file)?;

        let started = Instant::now();
        let mut file_result = TestFileResult::new(&file.file_name, environment);

        let mut store = VariableStore::new(environment, Arc::clone(&self.encryptor));
        store.add_or_update_batch(&file.variables);
        store.dump();

        let mut tests: Vec<&Test> = file.tests.iter().collect();
        tests.sort_by_key(|t| t.position);
        let total = tests.len();

        info!(total_tests = total, "Iniciando run");

        let mut state = RunState::Completed;
        for (index, test) in tests.into_iter().enumerate() {
            if stop.is_cancelled() {
                info!(index, "Stop observado, interrompendo run");
                state = RunState::Stopped;
                break;
            }

            let test_result = self.run_test(test, &mut store).await;
            listener.on_test_completed(index, &test_result).await;
            file_result.test_results.push(test_result);

            let is_last = index + 1 == total;
            if let Some(delay) = self.limits.clamp_delay(test.delay_ms).filter(|_| !is_last) {
                debug!(delay_ms = delay.as_millis() as u64, "Aguardando delay entre testes");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.cancelled() => {}
                }
            }
        }

        file_result.total_elapsed_ms = started.elapsed().as_millis() as u64;
        file_result.tally();

        info!(
            state = ?state,
            passed = file_result.total_passed,
            failed = file_result.total_failed,
            elapsed_ms = file_result.total_elapsed_ms,
            "Run finalizado"
        );

        Ok(RunOutcome {
            state,
            result: file_result,
        })
    }

    #[instrument(name = "test", skip_all, fields(position = test.position))]
    async fn run_test(&self, test: &Test, store: &mut VariableStore) -> TestResult {
        let url = store.substitute_plain(&test.url);
        let unresolved = store.unresolved_tokens(&url);
        if !unresolved.is_empty() {
            debug!(tokens = ?unresolved, "URL contém tokens sem variável");
        }

        let request = HttpRequest {
            method: test.method.clone(),
            url: url.clone(),
            headers: test
                .headers
                .iter()
                .map(|h| HeaderItem::new(store.substitute_plain(&h.key), store.substitute_plain(&h.value)))
                .collect(),
            body: test.post_body.as_ref().map(|b| store.substitute_plain(b)),
        };

        let start = Instant::now();
        let response = self.transport.send(&request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut result = TestResult {
            position: test.position,
            description: test.description.clone(),
            actual_url: url,
            elapsed_ms,
            ..Default::default()
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let code = e.code();
                warn!(
                    error = %e,
                    code = %code,
                    category = %code.category(),
                    kind = code.description(),
                    "Chamada HTTP falhou"
                );
                result.exception_message = Some(e.to_string());
                result.error_code = Some(code.formatted());
                // Dependentes deste teste veem as capturas como vazias.
                let blanks: Vec<Variable> = test
                    .captured_variables
                    .iter()
                    .map(|rule| Variable::new(rule.name.as_str(), "", store.environment()))
                    .collect();
                store.add_captured_batch(&blanks);
                result.captured_variables = blanks;
                return result;
            }
        };

        let expected = test.expected_status();
        result.response_code = Some(response.status_code);
        result.response_code_success = response.status_code == expected;
        if !result.response_code_success {
            result.error_code = Some(ErrorCode::STATUS_CODE_MISMATCH.formatted());
        }

        let captured = extractors::match_variables(&test.captured_variables, &response.body, store.environment());
        store.add_captured_batch(&captured);
        result.captured_variables = captured;

        result.assertion_results = assertions::evaluate_all(&test.assertions, &response.body, store);

        debug!(
            status = response.status_code,
            expected,
            success = result.success(),
            elapsed_ms,
            "Teste executado"
        );

        result
    }
}

// ============================================================================
// TESTES
// ============================================================================
