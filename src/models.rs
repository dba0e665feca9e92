//! Pipeline Configuration Models
//!
//! ## Visão Geral
//! Este módulo define as estruturas de configuração do pipeline, carregadas de
//! um arquivo TOML. Apenas `[paths]` é obrigatório; `[pipeline]` tem padrões.
//!
//! ## Boas Práticas
//! - **Encapsulamento**: Validações de integridade ocorrem no momento da carga.
//! - **Fail-Fast**: Configuração inválida impede a criação do contexto.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use polars::prelude::ParquetCompression;
use serde::Deserialize;

use crate::errors::PipelineError;

/// Configuração completa.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,

    #[serde(default)]
    pub pipeline: PipelineOptions,
}

/// Raízes de entrada e saída.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Contém `song_data/` e `log_data/`.
    pub input: PathBuf,

    /// Recebe `song`, `artist`, `user`, `time_table` e `songplay`.
    pub output: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineOptions {
    /// Tempo máximo de espera por etapa antes de abortar a execução.
    pub stage_timeout_secs: u64,

    pub join_strategy: JoinStrategy,

    /// Diferença máxima entre `length` do evento e `duration` da música (estratégia composta).
    pub duration_tolerance_secs: f64,

    pub compression: Compression,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 1800,
            join_strategy: JoinStrategy::Title,
            duration_tolerance_secs: 2.0,
            compression: Compression::Snappy,
        }
    }
}

/// Como um evento de reprodução é resolvido para uma música do catálogo.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Igualdade exata de título; títulos repetidos geram múltiplas linhas.
    Title,
    /// Título + nome do artista + duração dentro da tolerância; ambíguos são descartados.
    Composite,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Snappy,
    Zstd,
    Uncompressed,
}

impl Compression {
    pub fn parquet(self) -> ParquetCompression {
        match self {
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Zstd => ParquetCompression::Zstd(None),
            Compression::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl Config {
    /// Carrega e valida o arquivo de configuração TOML.
    ///
    /// # Erros
    /// Retorna `PipelineError::Config` se o arquivo não for encontrado ou
    /// se a estrutura for inválida.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Falha ao abrir o arquivo de configuração '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PipelineError> {
        let config: Config = toml::from_str(content)?;

        config.validate()?;
        Ok(config)
    }

    /// Validação pós-carga (Fail-Fast).
    fn validate(&self) -> Result<(), PipelineError> {
        if self.paths.input.as_os_str().is_empty() {
            return Err(PipelineError::Config("'paths.input' vazio".to_string()));
        }
        if self.paths.output.as_os_str().is_empty() {
            return Err(PipelineError::Config("'paths.output' vazio".to_string()));
        }
        if self.paths.input == self.paths.output {
            return Err(PipelineError::Config(
                "'paths.input' e 'paths.output' não podem coincidir".to_string(),
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "'pipeline.stage_timeout_secs' deve ser maior que zero".to_string(),
            ));
        }

        let tolerance = self.pipeline.duration_tolerance_secs;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "'pipeline.duration_tolerance_secs' inválido: {}",
                tolerance
            )));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }
}
