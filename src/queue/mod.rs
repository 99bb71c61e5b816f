//! # Módulo Queue - Fila de Execução de Arquivos
//!
//! Aceita pedidos de execução, roda arquivos em paralelo num pool limitado
//! e expõe o progresso de cada task.
//!
//! ## Para todos entenderem:
//!
//! Pense num balcão de atendimento com N guichês:
//! - Cada pedido recebe uma senha (`TaskId`) na hora
//! - Só N arquivos são atendidos ao mesmo tempo (semáforo)
//! - Qualquer um pode perguntar "em que teste está a senha 7?"
//! - Qualquer um pode pedir "pare a senha 7"
//!
//! ## Ciclo de vida de uma task:
//!
//! ```text
//!            stop()
//! Running ───────────> Stopped
//!    │
//!    ├── run terminou ──> Completed
//!    └── worker falhou ─> Errored
//! ```
//!
//! Um status terminal nunca volta a mudar. Depois de `stop()` o snapshot
//! fica congelado: o teste em andamento termina, mas seu resultado não é
//! mais publicado.
//!
//! ## Concorrência:
//!
//! - Arquivos diferentes: paralelos, limitados por `max_parallel_files`
//! - Testes do mesmo arquivo: sempre sequenciais (ver `runner`)
//! - Estado das tasks: `RwLock` compartilhado, nunca mantido durante I/O

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::errors::ErrorCode;
use crate::loader::TestFileSource;
use crate::progress::ProgressObserver;
use crate::protocol::{TaskDetails, TaskId, TaskRequest, TaskStatus, TestFile, TestFileResult, TestResult};
use crate::runner::{NoopListener, RunListener, RunState, TestFileRunner};
use crate::validation::DefinitionError;

// ============================================================================
// ERROS
// ============================================================================

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("could not load test file '{file_name}': {reason}")]
    Load { file_name: String, reason: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("worker for task {task_id} failed: {reason}")]
    Worker { task_id: TaskId, reason: String },
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TaskNotFound(_) => ErrorCode::TASK_NOT_FOUND,
            Self::Load { .. } => ErrorCode::TEST_FILE_NOT_FOUND,
            Self::Definition(e) => e.issues.first().map(|i| i.code()).unwrap_or(ErrorCode::INVALID_FILE_FORMAT),
            Self::Worker { .. } => ErrorCode::WORKER_FAILED,
        }
    }
}

// ============================================================================
// ESTADO INTERNO
// ============================================================================

struct TrackedTask {
    details: TaskDetails,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

type TaskMap = RwLock<HashMap<TaskId, TrackedTask>>;

struct QueueInner {
    next_id: AtomicU64,
    tasks: TaskMap,
    runner: Arc<TestFileRunner>,
    source: Arc<dyn TestFileSource>,
    observer: Arc<dyn ProgressObserver>,
    semaphore: Arc<Semaphore>,
}

/// Publica cada resultado no snapshot da task, enquanto ela estiver Running.
struct TaskProgress {
    inner: Arc<QueueInner>,
    task_id: TaskId,
}

#[async_trait]
impl RunListener for TaskProgress {
    async fn on_test_completed(&self, index: usize, result: &TestResult) {
        let accepted = {
            let mut tasks = self.inner.tasks.write().await;
            match tasks.get_mut(&self.task_id) {
                Some(task) if task.details.status == TaskStatus::Running => {
                    task.details.current_index = index + 1;
                    task.details.results.push(result.clone());
                    true
                }
                _ => false,
            }
        };

        if accepted {
            self.inner.observer.on_test_completed(self.task_id, result);
        }
    }
}

// ============================================================================
// FILA
// ============================================================================

/// Fila de execução. Clonar é barato: todos os clones compartilham as tasks.
#[derive(Clone)]
pub struct TestFileQueue {
    inner: Arc<QueueInner>,
}

impl TestFileQueue {
    pub fn new(
        runner: TestFileRunner,
        source: Arc<dyn TestFileSource>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let permits = runner.limits().worker_permits();
        Self {
            inner: Arc::new(QueueInner {
                next_id: AtomicU64::new(1),
                tasks: RwLock::new(HashMap::new()),
                runner: Arc::new(runner),
                source,
                observer,
                semaphore: Arc::new(Semaphore::new(permits)),
            }),
        }
    }

    fn load(&self, file_name: &str) -> Result<TestFile, QueueError> {
        let file = self.inner.source.load(file_name).map_err(|e| QueueError::Load {
            file_name: file_name.to_string(),
            reason: format!("{:#}", e),
        })?;
        self.inner.runner.validate(&file)?;
        Ok(file)
    }

    /// Enfileira um arquivo e retorna logo, sem esperar a execução.
    ///
    /// Arquivo inexistente ou malformado falha aqui, sem criar task.
    #[instrument(skip_all, fields(file = %request.file_name, environment = %request.environment))]
    pub async fn start(&self, request: TaskRequest) -> Result<TaskId, QueueError> {
        let file = self.load(&request.file_name)?;

        let task_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = CancellationToken::new();
        let details = TaskDetails {
            task_id,
            file_name: request.file_name.clone(),
            environment: request.environment.clone(),
            username: request.username.clone(),
            status: TaskStatus::Running,
            current_index: 0,
            total_tests: file.tests.len(),
            results: Vec::new(),
            errors: None,
        };

        // O lock é mantido até a task ser registrada, então o worker
        // nunca publica progresso de uma task desconhecida.
        let mut tasks = self.inner.tasks.write().await;
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            task_id,
            file,
            request.environment,
            stop.clone(),
        ));
        tasks.insert(
            task_id,
            TrackedTask {
                details,
                stop,
                handle: Some(handle),
            },
        );

        info!(task_id, "Task enfileirada");
        Ok(task_id)
    }

    /// Pede a parada da task e retorna o status no momento do pedido.
    ///
    /// Idempotente: parar uma task terminal só devolve o status dela.
    pub async fn stop(&self, task_id: TaskId) -> Result<String, QueueError> {
        let mut tasks = self.inner.tasks.write().await;
        let task = tasks.get_mut(&task_id).ok_or(QueueError::TaskNotFound(task_id))?;

        let previous = task.details.status;
        if previous == TaskStatus::Running {
            task.details.status = TaskStatus::Stopped;
            task.stop.cancel();
            info!(task_id, current_index = task.details.current_index, "Task parada");
        }

        Ok(previous.to_string())
    }

    /// Para todas as tasks em execução. Retorna uma linha por task afetada.
    pub async fn stop_all(&self) -> Vec<String> {
        let mut tasks = self.inner.tasks.write().await;
        let mut stopped: Vec<(TaskId, TaskStatus)> = Vec::new();

        for (id, task) in tasks.iter_mut() {
            if task.details.status == TaskStatus::Running {
                stopped.push((*id, task.details.status));
                task.details.status = TaskStatus::Stopped;
                task.stop.cancel();
            }
        }

        stopped.sort_by_key(|(id, _)| *id);
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Tasks paradas");
        }
        stopped
            .into_iter()
            .map(|(id, status)| format!("task {}: {}", id, status))
            .collect()
    }

    pub async fn list_running_tasks(&self) -> Vec<TaskDetails> {
        let tasks = self.inner.tasks.read().await;
        let mut running: Vec<TaskDetails> = tasks
            .values()
            .filter(|t| t.details.status == TaskStatus::Running)
            .map(|t| t.details.clone())
            .collect();
        running.sort_by_key(|d| d.task_id);
        running
    }

    pub async fn get_task_details(&self, task_id: TaskId) -> Result<TaskDetails, QueueError> {
        self.inner
            .tasks
            .read()
            .await
            .get(&task_id)
            .map(|t| t.details.clone())
            .ok_or(QueueError::TaskNotFound(task_id))
    }

    /// Espera o worker da task terminar e retorna o snapshot final.
    pub async fn join(&self, task_id: TaskId) -> Result<TaskDetails, QueueError> {
        let handle = {
            let mut tasks = self.inner.tasks.write().await;
            let task = tasks.get_mut(&task_id).ok_or(QueueError::TaskNotFound(task_id))?;
            task.handle.take()
        };

        if let Some(handle) = handle {
            // Pânicos já foram registrados pelo próprio worker.
            let _ = handle.await;
        }

        self.get_task_details(task_id).await
    }

    /// Remove tasks terminais. Retorna quantas foram removidas.
    pub async fn clear_finished(&self) -> usize {
        let mut tasks = self.inner.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !t.details.status.is_terminal());
        before - tasks.len()
    }

    /// Executa um arquivo até o fim, sem criar task e sem notificar observers.
    #[instrument(skip(self))]
    pub async fn run_file(&self, file_name: &str, environment: &str) -> Result<TestFileResult, QueueError> {
        let file = self.load(file_name)?;

        let _permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| QueueError::Worker {
                task_id: 0,
                reason: e.to_string(),
            })?;

        let outcome = self
            .inner
            .runner
            .run(&file, environment, &CancellationToken::new(), &NoopListener)
            .await?;
        Ok(outcome.result)
    }

    /// Como `run_file`, mas resume o resultado em texto: "Completed" ou "Errored: ...".
    pub async fn run_and_wait(&self, file_name: &str, environment: &str) -> String {
        match self.run_file(file_name, environment).await {
            Ok(_) => TaskStatus::Completed.to_string(),
            Err(e) => format!("{}: {}", TaskStatus::Errored, e),
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

async fn run_worker(
    inner: Arc<QueueInner>,
    task_id: TaskId,
    file: TestFile,
    environment: String,
    stop: CancellationToken,
) {
    let _permit = match Arc::clone(&inner.semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            finish(&inner, task_id, TaskStatus::Errored, Some(e.to_string())).await;
            return;
        }
    };

    let runner = Arc::clone(&inner.runner);
    let listener = TaskProgress {
        inner: Arc::clone(&inner),
        task_id,
    };

    // O run roda na sua própria task para que um pânico vire Errored.
    let run = tokio::spawn(async move { runner.run(&file, &environment, &stop, &listener).await });

    match run.await {
        Ok(Ok(outcome)) => {
            let status = match outcome.state {
                RunState::Completed => TaskStatus::Completed,
                RunState::Stopped => TaskStatus::Stopped,
            };
            let mut result = outcome.result;
            // Depois de um stop, o teste em andamento não entra no snapshot;
            // o resultado do arquivo acompanha o que foi publicado.
            if let Some(published) = finish(&inner, task_id, status, None).await {
                if result.test_results.len() > published {
                    result.test_results.truncate(published);
                    result.tally();
                }
            }
            inner.observer.on_file_completed(task_id, &result);
        }
        Ok(Err(definition)) => {
            warn!(task_id, error = %definition, "Arquivo rejeitado pelo worker");
            finish(&inner, task_id, TaskStatus::Errored, Some(definition.to_string())).await;
        }
        Err(join_error) => {
            error!(task_id, error = %join_error, "Worker falhou");
            finish(&inner, task_id, TaskStatus::Errored, Some(join_error.to_string())).await;
        }
    }
}

/// Aplica o status final, a menos que a task já tenha sido parada.
///
/// Retorna quantos resultados o snapshot da task publicou.
async fn finish(inner: &QueueInner, task_id: TaskId, status: TaskStatus, errors: Option<String>) -> Option<usize> {
    let mut tasks = inner.tasks.write().await;
    let task = tasks.get_mut(&task_id)?;
    if task.details.status == TaskStatus::Running {
        task.details.status = status;
        task.details.errors = errors;
        info!(task_id, status = %status, "Task finalizada");
    }
    Some(task.details.results.len())
}

// ============================================================================
// TESTES
// ============================================================================
