//! # Módulo de Carregamento - Leitura de Arquivos de Teste
//!
//! Lê e parseia arquivos de teste JSON. A fila não sabe de onde os arquivos
//! vêm: ela pede pelo nome a um `TestFileSource`.
//!
//! ## Fontes disponíveis:
//!
//! - `DirectorySource`: resolve o nome relativo a um diretório base
//! - `InMemorySource`: arquivos já construídos em memória (testes, embed)
//!
//! ## Exemplo de uso:
//!
//! ```rust,ignore
//! let source = DirectorySource::new("./suites");
//! let file = source.load("login.json")?;
//! println!("{} testes", file.tests.len());
//! ```

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::TestFile;

/// Carrega um arquivo de teste de um caminho JSON.
///
/// Se o JSON não declarar `file_name`, o nome do arquivo em disco é usado.
pub fn load_test_file_from_path<P: AsRef<Path>>(path: P) -> Result<TestFile> {
    let path_ref = path.as_ref();

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read test file {:?}", path_ref))?;

    let mut file: TestFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test file JSON {:?}", path_ref))?;

    if file.file_name.trim().is_empty() {
        file.file_name = path_ref
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    Ok(file)
}

/// Resolve nomes de arquivo em definições de teste.
pub trait TestFileSource: Send + Sync {
    fn load(&self, file_name: &str) -> Result<TestFile>;
}

/// Arquivos `.json` em um diretório base.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    base_dir: PathBuf,
}

impl DirectorySource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl TestFileSource for DirectorySource {
    fn load(&self, file_name: &str) -> Result<TestFile> {
        let mut file = load_test_file_from_path(self.base_dir.join(file_name))?;
        // A fila identifica o arquivo pelo nome pedido.
        file.file_name = file_name.to_string();
        Ok(file)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    files: HashMap<String, TestFile>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra o arquivo sob o seu `file_name`.
    pub fn with_file(mut self, file: TestFile) -> Self {
        self.files.insert(file.file_name.clone(), file);
        self
    }
}

impl TestFileSource for InMemorySource {
    fn load(&self, file_name: &str) -> Result<TestFile> {
        self.files
            .get(file_name)
            .cloned()
            .with_context(|| format!("Test file '{}' not found", file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AssertionMethod, AssertionType};
    use serde_json::json;
    use std::io::Write;

    fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(value.to_string().as_bytes()).unwrap();
    }

    #[test]
    fn test_load_full_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_json(
            dir.path(),
            "login.json",
            json!({
                "variables": [
                    { "name": "host", "value": "example.com" },
                    { "name": "host", "value": "dev.example.com", "environment": "DEV" }
                ],
                "tests": [
                    {
                        "position": 1,
                        "url": "http://{host}/login",
                        "method": "POST",
                        "post_body": "user=bob",
                        "headers": [ { "key": "Accept", "value": "text/html" } ],
                        "captured_variables": [ { "name": "token", "pattern": "token=(\\w+)" } ],
                        "assertions": [
                            { "description": "ok", "pattern": "Welcome", "type": "positive" },
                            { "description": "form", "pattern": "form", "type": "negative", "method": "selector" }
                        ],
                        "expected_status_code": 302,
                        "delay_ms": 10
                    },
                    { "position": 2, "url": "http://{host}/home" }
                ]
            }),
        );

        let file = DirectorySource::new(dir.path()).load("login.json").unwrap();

        assert_eq!(file.file_name, "login.json");
        assert_eq!(file.variables.len(), 2);
        assert_eq!(file.variables[0].environment, "");
        assert_eq!(file.tests.len(), 2);

        let first = &file.tests[0];
        assert_eq!(first.expected_status(), 302);
        assert_eq!(first.assertions[0].assertion_type, AssertionType::Positive);
        assert_eq!(first.assertions[0].method, AssertionMethod::Regex);
        assert_eq!(first.assertions[1].method, AssertionMethod::Selector);

        let second = &file.tests[1];
        assert_eq!(second.method, "GET");
        assert_eq!(second.expected_status(), 200);
        assert!(second.post_body.is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectorySource::new(dir.path()).load("nope.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read test file"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = load_test_file_from_path(dir.path().join("bad.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_unparseable_status_code_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_json(
            dir.path(),
            "status.json",
            json!({ "tests": [ { "position": 0, "url": "http://h", "expected_status_code": "abc" } ] }),
        );
        assert!(load_test_file_from_path(dir.path().join("status.json")).is_err());
    }

    #[test]
    fn test_in_memory_source() {
        let file = TestFile {
            file_name: "a.json".to_string(),
            variables: vec![],
            tests: vec![],
        };
        let source = InMemorySource::new().with_file(file.clone());
        assert_eq!(source.load("a.json").unwrap(), file);
        assert!(source.load("b.json").is_err());
    }
}
