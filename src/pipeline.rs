//! # Orquestração do Pipeline
//!
//! Sequência linear: Catalog Loader → Event Loader → Fact Builder. Cada etapa
//! roda em uma thread nomeada e o driver espera no máximo o timeout configurado;
//! qualquer falha aborta a execução. Como toda escrita é sobrescrita total,
//! repetir a execução é o mecanismo de recuperação.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::catalog;
use crate::errors::PipelineError;
use crate::events;
use crate::facts::{self, JoinOptions};
use crate::models::Config;
use crate::writer::{self, WriteOptions, WriteSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CatalogLoader,
    EventLoader,
    FactBuilder,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::CatalogLoader => "catalog_loader",
            Stage::EventLoader => "event_loader",
            Stage::FactBuilder => "fact_builder",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contexto de uma execução: criado no início, repassado às etapas e liberado no fim.
#[derive(Debug)]
pub struct PipelineContext {
    config: Config,
    started_at: Instant,
}

impl PipelineContext {
    /// Prepara a raiz de saída e registra o início da execução.
    pub fn create(config: Config) -> Result<Self, PipelineError> {
        fs::create_dir_all(&config.paths.output)?;

        info!(
            "Contexto criado: entrada={} saída={}",
            config.paths.input.display(),
            config.paths.output.display()
        );

        Ok(Self {
            config,
            started_at: Instant::now(),
        })
    }

    pub fn input_root(&self) -> &Path {
        &self.config.paths.input
    }

    pub fn output_root(&self) -> &Path {
        &self.config.paths.output
    }

    pub fn stage_timeout(&self) -> Duration {
        self.config.stage_timeout()
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            compression: self.config.pipeline.compression,
        }
    }

    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            strategy: self.config.pipeline.join_strategy,
            duration_tolerance_secs: self.config.pipeline.duration_tolerance_secs,
        }
    }

    /// Encerra a execução, removendo diretórios de staging remanescentes.
    pub fn release(self) -> Result<Duration, PipelineError> {
        let removed = writer::remove_staging_leftovers(self.output_root())?;
        if removed > 0 {
            warn!("{} diretórios de staging remanescentes removidos", removed);
        }

        let elapsed = self.started_at.elapsed();
        info!("Contexto liberado após {:.2?}", elapsed);
        Ok(elapsed)
    }
}

/// Libera um contexto compartilhado com as etapas.
///
/// Falha com `PipelineError::ContextInUse` se alguma etapa ainda detém o
/// contexto (thread expirada ainda rodando); nesse caso o staging não é
/// tocado, pois pode estar sendo escrito.
pub fn release_shared(ctx: Arc<PipelineContext>) -> Result<Duration, PipelineError> {
    match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.release(),
        Err(shared) => Err(PipelineError::ContextInUse {
            holders: Arc::strong_count(&shared) - 1,
        }),
    }
}

/// Executa `job` em uma thread dedicada, esperando no máximo `timeout`.
///
/// A thread de uma etapa expirada não é interrompida; o erro devolvido aborta a
/// execução e o processo encerra em seguida.
pub fn run_stage<T, F>(stage: Stage, timeout: Duration, job: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let timer = Instant::now();
    info!("Etapa '{}' iniciada", stage);

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(stage.name().to_string())
        .spawn(move || {
            // O receptor pode já ter desistido por timeout
            let _ = tx.send(job());
        })?;

    let result = match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(PipelineError::Timeout { stage, timeout }),
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::StagePanicked { stage }),
    };

    match &result {
        Ok(_) => info!("Etapa '{}' concluída ({:.2?})", stage, timer.elapsed()),
        Err(e) => warn!("Etapa '{}' falhou após {:.2?}: {}", stage, timer.elapsed(), e),
    }
    result
}

/// Tabelas publicadas por uma execução completa, na ordem de escrita.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tables: Vec<WriteSummary>,
}

/// Executa as três etapas em sequência.
///
/// O Fact Builder só começa depois que o Catalog Loader publicou `song` com o
/// marcador `_SUCCESS`, pois relê essa tabela do armazenamento.
pub fn run(ctx: Arc<PipelineContext>) -> Result<RunSummary, PipelineError> {
    let timeout = ctx.stage_timeout();
    let mut tables = Vec::new();

    let stage_ctx = Arc::clone(&ctx);
    let catalog_tables = run_stage(Stage::CatalogLoader, timeout, move || {
        catalog::process_song_data(&stage_ctx)
    })?;
    tables.extend(catalog_tables);

    let stage_ctx = Arc::clone(&ctx);
    let event_output = run_stage(Stage::EventLoader, timeout, move || {
        events::process_log_data(&stage_ctx)
    })?;
    tables.extend(event_output.written);

    let stage_ctx = Arc::clone(&ctx);
    let playbacks = event_output.playbacks;
    let songplays = run_stage(Stage::FactBuilder, timeout, move || {
        facts::process_songplays(&stage_ctx, &playbacks)
    })?;
    tables.push(songplays);

    Ok(RunSummary { tables })
}

/// Ciclo completo de uma execução: roda as etapas e libera o contexto, com
/// sucesso ou falha.
///
/// O erro da execução tem precedência; uma falha na liberação só é devolvida
/// quando as etapas terminaram bem.
pub fn execute(ctx: PipelineContext) -> Result<RunSummary, PipelineError> {
    let ctx = Arc::new(ctx);
    let outcome = run(Arc::clone(&ctx));
    let released = release_shared(ctx);

    match (outcome, released) {
        (Ok(summary), Ok(_)) => Ok(summary),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(release_error)) => {
            error!("Falha ao liberar o contexto: {}", release_error);
            Err(e)
        }
    }
}
