//! Engine de execução de suítes de testes HTTP.
//!
//! Um arquivo de teste declara variáveis e uma sequência ordenada de
//! requisições. Cada resposta pode capturar novas variáveis (via regex) e é
//! validada por assertions (regex ou seletor CSS). A fila executa vários
//! arquivos em paralelo e expõe o progresso de cada um.

pub mod assertions;
pub mod context;
pub mod errors;
pub mod extractors;
pub mod limits;
pub mod loader;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod runner;
pub mod telemetry;
pub mod transport;
pub mod validation;
