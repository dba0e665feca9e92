//! # Catalog Loader
//!
//! Lê o catálogo bruto de músicas e deriva as dimensões `song` e `artist`.

use std::path::Path;
use std::time::Instant;

use polars::prelude::*;
use tracing::info;

use crate::errors::PipelineError;
use crate::impl_errors::StageContext;
use crate::pipeline::{PipelineContext, Stage};
use crate::schema::{SongRecord, Table};
use crate::source::{self, SONG_FILE_DEPTH};
use crate::writer::{self, WriteSummary};

/// Lê `song_data/*/*/*/*.json` sob `input_root` como um DataFrame com o schema fixo do catálogo.
pub fn load_song_data(input_root: &Path) -> Result<DataFrame, PipelineError> {
    let root = input_root.join("song_data");
    let files = source::discover_json_files(&root, SONG_FILE_DEPTH)?;
    let records: Vec<SongRecord> = source::read_records(&files, "song_data")?;

    info!("{} registros de música em {} arquivos", records.len(), files.len());
    Ok(SongRecord::to_frame(&records)?)
}

/// Dimensão `song`: projeção sem linhas duplicadas.
pub fn songs_table(raw: &DataFrame) -> PolarsResult<DataFrame> {
    raw.clone()
        .lazy()
        .select([
            col("song_id"),
            col("title"),
            col("artist_id"),
            col("year"),
            col("duration"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
}

/// Dimensão `artist`: campos do artista renomeados, sem linhas duplicadas.
pub fn artists_table(raw: &DataFrame) -> PolarsResult<DataFrame> {
    raw.clone()
        .lazy()
        .select([
            col("artist_id"),
            col("artist_name").alias("name"),
            col("artist_location").alias("location"),
            col("artist_latitude").alias("latitude"),
            col("artist_longitude").alias("longitude"),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
}

/// Etapa completa: leitura do catálogo e gravação de `song` e `artist`.
pub fn process_song_data(ctx: &PipelineContext) -> Result<Vec<WriteSummary>, PipelineError> {
    let stage = Stage::CatalogLoader;
    let raw = load_song_data(ctx.input_root()).in_stage(stage)?;

    let timer = Instant::now();
    info!("Criando tabela '{}'", Table::Songs);
    let songs = songs_table(&raw).in_table(stage, Table::Songs)?;
    info!("'{}': {} linhas ({:.2?})", Table::Songs, songs.height(), timer.elapsed());

    let songs_written = writer::write_table(Table::Songs, &songs, ctx.output_root(), &ctx.write_options())
        .in_table(stage, Table::Songs)?;

    let timer = Instant::now();
    info!("Criando tabela '{}'", Table::Artists);
    let artists = artists_table(&raw).in_table(stage, Table::Artists)?;
    info!("'{}': {} linhas ({:.2?})", Table::Artists, artists.height(), timer.elapsed());

    let artists_written =
        writer::write_table(Table::Artists, &artists, ctx.output_root(), &ctx.write_options())
            .in_table(stage, Table::Artists)?;

    Ok(vec![songs_written, artists_written])
}
