//! Implementações de traits para o enum de erro do pipeline
//!
//! Este módulo existe exclusivamente para desacoplar:
//! - definição de erros (enum em `errors.rs`)
//! - conversões e anexação de contexto (etapa / tabela)

use crate::errors::PipelineError;
use crate::pipeline::Stage;
use crate::schema::Table;

/* ========================================================================== */
/* Conversions                                                                */
/* ========================================================================== */

impl From<walkdir::Error> for PipelineError {
    fn from(err: walkdir::Error) -> Self {
        PipelineError::Io(err.into())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Config(format!("Erro no TOML: {}", err))
    }
}

/* ========================================================================== */
/* Stage context                                                              */
/* ========================================================================== */

/// Anexa o nome da etapa (e da tabela) a qualquer erro conversível em `PipelineError`.
///
/// Erros que já carregam contexto de etapa não são embrulhados novamente, de modo
/// que a mensagem final aponta para o ponto mais interno da falha.
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T, PipelineError>;

    fn in_table(self, stage: Stage, table: Table) -> Result<T, PipelineError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<PipelineError>,
{
    fn in_stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|err| wrap(err.into(), stage, None))
    }

    fn in_table(self, stage: Stage, table: Table) -> Result<T, PipelineError> {
        self.map_err(|err| wrap(err.into(), stage, Some(table)))
    }
}

fn wrap(err: PipelineError, stage: Stage, table: Option<Table>) -> PipelineError {
    match err {
        // Timeouts e pânicos já nomeiam a etapa
        already @ (PipelineError::Stage { .. }
        | PipelineError::Timeout { .. }
        | PipelineError::StagePanicked { .. }) => already,
        other => PipelineError::Stage {
            stage,
            table,
            source: Box::new(other),
        },
    }
}
