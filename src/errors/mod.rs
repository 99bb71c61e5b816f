//! # Módulo de Códigos de Erro Estruturados
//!
//! Define códigos de erro padronizados para que quem consome os resultados
//! (dashboard, CI, API de status) consiga classificar falhas sem comparar
//! mensagens de texto.
//!
//! ## Categorias de Erro
//!
//! | Faixa  | Categoria       | Descrição                                  |
//! |--------|-----------------|--------------------------------------------|
//! | E1xxx  | Definição       | Arquivo de teste malformado (aborta o run) |
//! | E2xxx  | Transporte      | A chamada HTTP falhou                      |
//! | E3xxx  | Avaliação       | Regex/seletor inválido ou sem match        |
//! | E4xxx  | Fila/Config     | Task inexistente, arquivo não encontrado   |
//! | E5xxx  | Interno         | Bug no próprio engine                      |
//!
//! Só a categoria E1xxx é fatal para um run. As demais degradam o resultado
//! de um único teste ou de uma única regra.
//!
//! ## Exemplo:
//!
//! ```text
//! E2001 Timeout HTTP
//!   teste: posição 3
//!   mensagem: operation timed out
//! ```

use std::fmt;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// Primeiro dígito = categoria, últimos três = erro específico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Definição
    // ========================================================================

    /// Teste sem URL.
    pub const MISSING_URL: Self = Self(1001);

    /// Método HTTP que não é um token válido.
    pub const INVALID_HTTP_METHOD: Self = Self(1002);

    /// Duas declarações com a mesma posição.
    pub const DUPLICATE_POSITION: Self = Self(1003);

    /// Arquivo com mais testes do que `max_tests_per_file`.
    pub const TOO_MANY_TESTS: Self = Self(1004);

    /// Variável declarada com nome vazio.
    pub const EMPTY_VARIABLE_NAME: Self = Self(1005);

    /// Arquivo de teste que não pôde ser parseado.
    pub const INVALID_FILE_FORMAT: Self = Self(1006);

    // ========================================================================
    // E2xxx: Transporte HTTP
    // ========================================================================

    /// Timeout na requisição.
    pub const HTTP_TIMEOUT: Self = Self(2001);

    /// Erro de conexão (DNS, recusa, reset).
    pub const HTTP_CONNECTION_ERROR: Self = Self(2002);

    /// Requisição não pôde ser montada (URL ou header inválido).
    pub const HTTP_INVALID_REQUEST: Self = Self(2003);

    /// Body da resposta não pôde ser lido.
    pub const HTTP_BODY_ERROR: Self = Self(2004);

    // ========================================================================
    // E3xxx: Avaliação
    // ========================================================================

    /// Status code diferente do esperado.
    pub const STATUS_CODE_MISMATCH: Self = Self(3001);

    /// Regex de captura inválida.
    pub const CAPTURE_INVALID_REGEX: Self = Self(3010);

    /// Regex de captura sem match no body.
    pub const CAPTURE_NO_MATCH: Self = Self(3011);

    /// Regex de assertion inválida.
    pub const ASSERTION_INVALID_REGEX: Self = Self(3020);

    /// Seletor CSS de assertion inválido.
    pub const ASSERTION_INVALID_SELECTOR: Self = Self(3021);

    // ========================================================================
    // E4xxx: Fila / Configuração
    // ========================================================================

    /// Task id desconhecido.
    pub const TASK_NOT_FOUND: Self = Self(4001);

    /// Arquivo de teste não encontrado ou ilegível.
    pub const TEST_FILE_NOT_FOUND: Self = Self(4002);

    // ========================================================================
    // E5xxx: Interno
    // ========================================================================

    /// Worker terminou de forma inesperada (panic).
    pub const WORKER_FAILED: Self = Self(5001);

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Código com prefixo "E", ex: "E2001".
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Definition,
            2 => ErrorCategory::Transport,
            3 => ErrorCategory::Evaluation,
            4 => ErrorCategory::Queue,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Descrição curta, útil em logs.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "URL ausente",
            1002 => "Método HTTP inválido",
            1003 => "Posição duplicada",
            1004 => "Arquivo excede o limite de testes",
            1005 => "Nome de variável vazio",
            1006 => "Formato de arquivo inválido",
            2001 => "Timeout HTTP",
            2002 => "Erro de conexão",
            2003 => "Requisição inválida",
            2004 => "Erro ao ler body da resposta",
            3001 => "Status code não corresponde",
            3010 => "Regex de captura inválida",
            3011 => "Captura sem match",
            3020 => "Regex de assertion inválida",
            3021 => "Seletor de assertion inválido",
            4001 => "Task não encontrada",
            4002 => "Arquivo de teste não encontrado",
            5001 => "Worker falhou",
            _ => "Erro desconhecido",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// CATEGORIA DE ERRO
// ============================================================================

/// Categoria derivada do primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// E1xxx, aborta o run antes de começar.
    Definition,
    /// E2xxx, localizado no teste que fez a chamada.
    Transport,
    /// E3xxx, localizado na regra avaliada.
    Evaluation,
    /// E4xxx, erro na API da fila.
    Queue,
    /// E5xxx.
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition => write!(f, "Definição"),
            Self::Transport => write!(f, "Transporte"),
            Self::Evaluation => write!(f, "Avaliação"),
            Self::Queue => write!(f, "Fila"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}
