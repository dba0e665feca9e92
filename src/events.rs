//! # Event Loader
//!
//! Lê os logs de eventos, mantém apenas reproduções (`page == "NextSong"`) e
//! deriva as dimensões `user` e `time`.
//!
//! Convenção de dia da semana em `weekday`: 1 = domingo … 7 = sábado.

use std::path::Path;
use std::time::Instant;

use polars::prelude::*;
use tracing::info;

use crate::errors::PipelineError;
use crate::impl_errors::StageContext;
use crate::pipeline::{PipelineContext, Stage};
use crate::schema::{EventRecord, Table};
use crate::source::{self, LOG_FILE_DEPTH};
use crate::writer::{self, WriteSummary};

/// Único tipo de evento que alimenta as tabelas derivadas.
pub const PLAYBACK_PAGE: &str = "NextSong";

/// Lê `log_data/*.json` sob `input_root` como um DataFrame com o schema fixo de eventos.
pub fn load_log_data(input_root: &Path) -> Result<DataFrame, PipelineError> {
    let root = input_root.join("log_data");
    let files = source::discover_json_files(&root, LOG_FILE_DEPTH)?;
    let records: Vec<EventRecord> = source::read_records(&files, "log_data")?;

    info!("{} eventos em {} arquivos", records.len(), files.len());
    Ok(EventRecord::to_frame(&records)?)
}

/// Remove duplicatas exatas, filtra reproduções e acrescenta as colunas de calendário.
///
/// Colunas acrescentadas: `start_time` (datetime em ms a partir de `ts`), `date`,
/// `hour`, `day`, `week` (ISO), `month`, `year` e `weekday`.
pub fn playback_events(raw: &DataFrame) -> PolarsResult<DataFrame> {
    raw.clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .filter(col("page").eq(lit(PLAYBACK_PAGE)))
        .with_column(
            col("ts")
                .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                .alias("start_time"),
        )
        .with_columns(calendar_columns())
        .collect()
}

fn calendar_columns() -> Vec<Expr> {
    let start_time = || col("start_time").dt();

    vec![
        start_time().date().alias("date"),
        start_time().hour().cast(DataType::Int32).alias("hour"),
        start_time().day().cast(DataType::Int32).alias("day"),
        start_time().week().cast(DataType::Int32).alias("week"),
        start_time().month().cast(DataType::Int32).alias("month"),
        start_time().year().cast(DataType::Int32).alias("year"),
        // ISO (1 = segunda) -> 1 = domingo
        (start_time().weekday().cast(DataType::Int32) % lit(7) + lit(1)).alias("weekday"),
    ]
}

/// Dimensão `user`: linhas completas distintas (níveis diferentes do mesmo usuário permanecem).
pub fn users_table(events: &DataFrame) -> PolarsResult<DataFrame> {
    events
        .clone()
        .lazy()
        .select([
            col("userId"),
            col("firstName"),
            col("lastName"),
            col("gender"),
            col("level"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
}

/// Dimensão `time`: uma linha por `start_time` distinto.
pub fn time_table(events: &DataFrame) -> PolarsResult<DataFrame> {
    events
        .clone()
        .lazy()
        .select([
            col("start_time"),
            col("hour"),
            col("day"),
            col("week"),
            col("month"),
            col("year"),
            col("weekday"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
}

/// Resultado da etapa: tabelas gravadas e o conjunto de reproduções para o Fact Builder.
pub struct EventOutput {
    pub written: Vec<WriteSummary>,
    pub playbacks: DataFrame,
}

/// Etapa completa: leitura dos logs e gravação de `user` e `time_table`.
pub fn process_log_data(ctx: &PipelineContext) -> Result<EventOutput, PipelineError> {
    let stage = Stage::EventLoader;
    let raw = load_log_data(ctx.input_root()).in_stage(stage)?;

    let playbacks = playback_events(&raw).in_stage(stage)?;
    info!(
        "{} reproduções '{}' de {} eventos",
        playbacks.height(),
        PLAYBACK_PAGE,
        raw.height()
    );

    let timer = Instant::now();
    info!("Criando tabela '{}'", Table::Users);
    let users = users_table(&playbacks).in_table(stage, Table::Users)?;
    info!("'{}': {} linhas ({:.2?})", Table::Users, users.height(), timer.elapsed());

    let users_written = writer::write_table(Table::Users, &users, ctx.output_root(), &ctx.write_options())
        .in_table(stage, Table::Users)?;

    let timer = Instant::now();
    info!("Criando tabela '{}'", Table::Time);
    let time = time_table(&playbacks).in_table(stage, Table::Time)?;
    info!("'{}': {} linhas ({:.2?})", Table::Time, time.height(), timer.elapsed());

    let time_written = writer::write_table(Table::Time, &time, ctx.output_root(), &ctx.write_options())
        .in_table(stage, Table::Time)?;

    Ok(EventOutput {
        written: vec![users_written, time_written],
        playbacks,
    })
}
