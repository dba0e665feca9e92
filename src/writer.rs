//! # Escrita Particionada em Parquet
//!
//! Persiste cada tabela do modelo estrela sob a raiz de saída, com sobrescrita
//! total por execução, e relê tabelas já publicadas.
//!
//! Layout de uma tabela particionada por `year` e `month`:
//!
//! ```text
//! <output>/songplay/_SUCCESS
//! <output>/songplay/year=2018/month=11/part-00000.parquet
//! ```
//!
//! As colunas-chave não são gravadas nos arquivos; são restauradas a partir do
//! caminho na leitura. Valores são percent-encoded e cada segmento
//! `chave=valor` precisa caber em 255 bytes (limite de nome do sistema de
//! arquivos); um valor maior aborta a escrita da tabela antes de qualquer
//! partição ser criada.
//!
//! O marcador `_SUCCESS` é o último arquivo escrito no diretório de staging,
//! que só então substitui a versão anterior.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::StatisticsOptions;
use polars::io::HiveOptions;
use polars::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::PipelineError;
use crate::models::Compression;
use crate::schema::{SCHEMA_VERSION, Table};

pub const SUCCESS_MARKER: &str = "_SUCCESS";
const PART_FILE: &str = "part-00000.parquet";
const STAGING_SUFFIX: &str = "._temporary";
const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";
/// Limite usual de nome de arquivo (ext4, APFS, NTFS).
const MAX_SEGMENT_BYTES: usize = 255;

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub compression: Compression,
}

/// Resultado da escrita de uma tabela.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub table: Table,
    pub rows: usize,
    pub partitions: usize,
    pub path: PathBuf,
}

pub fn table_path(output_root: &Path, table: Table) -> PathBuf {
    output_root.join(table.dir_name())
}

fn staging_path(output_root: &Path, table: Table) -> PathBuf {
    output_root.join(format!(".{}{}", table.dir_name(), STAGING_SUFFIX))
}

/// Grava a tabela completa, sobrescrevendo qualquer versão anterior no destino.
///
/// # Errors
///
/// * `PipelineError::Polars` se o DataFrame não respeitar o schema declarado da tabela.
/// * `PipelineError::Io` em falhas de disco. Neste caso a versão anterior permanece
///   intacta ou removida, mas nunca parcialmente sobrescrita.
pub fn write_table(
    table: Table,
    frame: &DataFrame,
    output_root: &Path,
    options: &WriteOptions,
) -> Result<WriteSummary, PipelineError> {
    let timer = Instant::now();
    let mut frame = table.conform(frame)?;

    let staging = staging_path(output_root, table);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let keys = table.partition_keys();
    let partitions = if keys.is_empty() {
        write_parquet(&staging.join(PART_FILE), &mut frame, options)?;
        1
    } else {
        write_partitions(table, &frame, &staging, options)?
    };

    fs::write(
        staging.join(SUCCESS_MARKER),
        format!("schema_version={}\n", SCHEMA_VERSION),
    )?;

    // Troca: remove a versão anterior e publica o staging sob o nome final
    let destination = table_path(output_root, table);
    if destination.exists() {
        fs::remove_dir_all(&destination)?;
    }
    fs::rename(&staging, &destination)?;

    info!(
        "Tabela '{}' gravada: {} linhas, {} partições em {} ({:.2?})",
        table,
        frame.height(),
        partitions,
        destination.display(),
        timer.elapsed()
    );

    Ok(WriteSummary {
        table,
        rows: frame.height(),
        partitions,
        path: destination,
    })
}

fn write_partitions(
    table: Table,
    frame: &DataFrame,
    staging: &Path,
    options: &WriteOptions,
) -> Result<usize, PipelineError> {
    if frame.height() == 0 {
        return Ok(0);
    }

    let keys = table.partition_keys();
    let value_columns: Vec<&str> = table
        .columns()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| !keys.contains(name))
        .collect();

    let parts = frame.partition_by_stable(keys.iter().copied(), true)?;

    // Todos os caminhos são validados antes de escrever a primeira partição
    let mut dirs = Vec::with_capacity(parts.len());
    for part in &parts {
        let mut dir = staging.to_path_buf();
        for key in keys {
            let value = part.column(key)?.get(0)?;
            dir.push(partition_segment(key, &value)?);
        }
        dirs.push(dir);
    }

    for (part, dir) in parts.iter().zip(&dirs) {
        fs::create_dir_all(dir)?;

        let mut data = part.select(value_columns.iter().copied())?;
        write_parquet(&dir.join(PART_FILE), &mut data, options)?;
        debug!("Partição {} ({} linhas)", dir.display(), data.height());
    }

    Ok(parts.len())
}

fn write_parquet(
    path: &Path,
    frame: &mut DataFrame,
    options: &WriteOptions,
) -> Result<(), PipelineError> {
    let file_out = File::create(path)?;

    let stats_options = StatisticsOptions {
        min_value: true,
        max_value: true,
        null_count: true,
        distinct_count: false,
    };

    ParquetWriter::new(file_out)
        .with_compression(options.compression.parquet())
        .with_statistics(stats_options)
        .finish(frame)?;

    Ok(())
}

/// Relê uma tabela publicada, restaurando as colunas de partição com os tipos declarados.
///
/// A leitura dos diretórios `chave=valor` fica com o scan hive do Polars, que
/// decodifica os valores e trata `__HIVE_DEFAULT_PARTITION__` como nulo.
///
/// # Errors
///
/// * `PipelineError::MissingTable` se o diretório ou o marcador `_SUCCESS` não existir.
/// * `PipelineError::Schema` se o marcador indicar outra versão de schema.
pub fn read_table(table: Table, output_root: &Path) -> Result<DataFrame, PipelineError> {
    let path = table_path(output_root, table);
    let marker = path.join(SUCCESS_MARKER);

    if !marker.is_file() {
        return Err(PipelineError::MissingTable { table, path });
    }

    let expected = format!("schema_version={}", SCHEMA_VERSION);
    let marker_content = fs::read_to_string(&marker)?;
    if marker_content.trim() != expected {
        return Err(PipelineError::Schema(format!(
            "tabela '{}' gravada com '{}', esperado '{}'",
            table,
            marker_content.trim(),
            expected
        )));
    }

    // Tabela particionada vazia: só o marcador, nenhum arquivo para o scan
    if !has_parquet_files(&path)? {
        return Ok(DataFrame::empty_with_schema(&table.schema()));
    }

    let (pattern, hive_options) = if table.partition_keys().is_empty() {
        (
            path.join("*.parquet"),
            HiveOptions {
                enabled: Some(false),
                ..Default::default()
            },
        )
    } else {
        (
            path.join("**").join("*.parquet"),
            HiveOptions {
                enabled: Some(true),
                schema: Some(Arc::new(table.key_schema())),
                ..Default::default()
            },
        )
    };

    let args = ScanArgsParquet {
        hive_options,
        ..Default::default()
    };

    let merged = LazyFrame::scan_parquet(&pattern, args)?
        .select(table.column_exprs())
        .collect()?;

    debug!("Tabela '{}' relida: {} linhas", table, merged.height());
    Ok(merged)
}

fn has_parquet_files(path: &Path) -> Result<bool, PipelineError> {
    for entry in WalkDir::new(path) {
        let entry = entry?;
        let is_parquet = entry.path().extension().is_some_and(|ext| ext == "parquet");
        if entry.file_type().is_file() && is_parquet {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Segmento `chave=valor` de um diretório de partição.
///
/// Valores são percent-encoded; um texto igual ao marcador de nulo tem os
/// sublinhados codificados para não ser relido como nulo.
fn partition_segment(key: &str, value: &AnyValue) -> Result<String, PipelineError> {
    let encoded = match value {
        AnyValue::Null => NULL_PARTITION.to_string(),
        AnyValue::String(s) => encode_partition_value(s),
        AnyValue::StringOwned(s) => encode_partition_value(s.as_str()),
        other => encode_partition_value(&other.to_string()),
    };

    let segment = format!("{}={}", key, encoded);
    if segment.len() > MAX_SEGMENT_BYTES {
        return Err(PipelineError::Schema(format!(
            "valor de partição '{}' excede {} bytes no caminho ({} bytes)",
            key,
            MAX_SEGMENT_BYTES,
            segment.len()
        )));
    }
    Ok(segment)
}

fn encode_partition_value(raw: &str) -> String {
    if raw == NULL_PARTITION {
        return raw.replace('_', "%5F");
    }
    urlencoding::encode(raw).into_owned()
}

/// Remove diretórios de staging deixados por execuções interrompidas.
pub fn remove_staging_leftovers(output_root: &Path) -> Result<usize, PipelineError> {
    if !output_root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(output_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_staging = name
            .to_str()
            .is_some_and(|n| n.starts_with('.') && n.ends_with(STAGING_SUFFIX));

        if is_staging && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
