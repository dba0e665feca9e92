//! # Definição de Erros do Pipeline
//!
//! Este módulo centraliza as falhas possíveis durante a transformação (ETL)
//! do catálogo de músicas e dos logs de reprodução.
//!
//! # Error Handling Strategy
//! - **Tipagem:** Enums para tratamento exaustivo.
//! - **Contexto:** Toda falha que deixa uma etapa carrega o nome da etapa e, quando
//!   aplicável, da tabela (ver `impl_errors::StageContext`).
//! - **Fail-Fast:** Não há retry nem descarte por registro; o pipeline aborta.

use std::path::PathBuf;
use std::time::Duration;

use polars::prelude::PolarsError;
use thiserror::Error;

use crate::pipeline::Stage;
use crate::schema::Table;

/// Enumeração central de falhas do pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Falhas no sistema de arquivos (permissão, disco cheio, arquivo inexistente).
    #[error("[I/O] {0}")]
    Io(#[from] std::io::Error),

    /// Registro bruto que não é JSON válido sob o schema fixo.
    #[error("[JSON] {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Erros originados na engine de dataframes.
    #[error("[Polars] {0}")]
    Polars(#[from] PolarsError),

    /// Violações de contrato entre etapas (colunas ausentes, versão de schema).
    #[error("[Schema] {0}")]
    Schema(String),

    /// Arquivo de configuração ausente ou inválido.
    #[error("[Config] {0}")]
    Config(String),

    /// Tabela lida do armazenamento sem o marcador de escrita concluída.
    #[error("[Storage] tabela '{table}' ausente ou incompleta em {}", .path.display())]
    MissingTable { table: Table, path: PathBuf },

    #[error("[Timeout] etapa '{stage}' excedeu {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("[Panic] etapa '{stage}' terminou sem resultado")]
    StagePanicked { stage: Stage },

    #[error("[Contexto] ainda em uso por {holders} etapa(s); staging preservado")]
    ContextInUse { holders: usize },

    /// Falha de uma etapa, com o contexto de onde ocorreu.
    #[error("[{stage}{}] {source}", table_suffix(.table))]
    Stage {
        stage: Stage,
        table: Option<Table>,
        #[source]
        source: Box<PipelineError>,
    },
}

fn table_suffix(table: &Option<Table>) -> String {
    match table {
        Some(table) => format!("/{}", table),
        None => String::new(),
    }
}
