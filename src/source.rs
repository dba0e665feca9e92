//! # Leitura das Fontes Brutas
//!
//! Descoberta dos arquivos JSON de entrada e parse estrito contra os schemas fixos.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::PipelineError;

/// Profundidade dos arquivos do catálogo: `song_data/*/*/*/*.json`.
pub const SONG_FILE_DEPTH: usize = 4;

/// Profundidade dos arquivos de log: `log_data/*.json`.
pub const LOG_FILE_DEPTH: usize = 1;

/// Lista os arquivos `.json` exatamente `depth` níveis abaixo de `root`, ordenados por caminho.
///
/// # Errors
///
/// Retorna `PipelineError::Io` se `root` não existir ou não puder ser percorrido.
pub fn discover_json_files(root: &Path, depth: usize) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
    {
        let entry = entry?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");

        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }

    debug!("{} arquivos JSON em {}", files.len(), root.display());
    Ok(files)
}

/// Lê todos os registros de todos os arquivos, na ordem dos arquivos.
///
/// Cada arquivo pode conter um ou mais objetos JSON separados por espaço em branco
/// (um por arquivo no catálogo, um por linha nos logs).
///
/// # Errors
///
/// Modo estrito: o primeiro arquivo ilegível ou com JSON inválido sob o schema
/// aborta a leitura com `PipelineError::Json`, identificando o arquivo.
pub fn read_records<R>(files: &[PathBuf], label: &str) -> Result<Vec<R>, PipelineError>
where
    R: DeserializeOwned,
{
    let pb = progress_bar(files.len() as u64, label);
    let mut records = Vec::new();

    for path in files {
        let content = fs::read_to_string(path)?;

        for record in serde_json::Deserializer::from_str(&content).into_iter::<R>() {
            let record = record.map_err(|source| PipelineError::Json {
                path: path.clone(),
                source,
            })?;
            records.push(record);
        }

        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(records)
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    pb.set_style(style);
    pb.set_message(format!("Lendo {}", label));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EventRecord, SongRecord};
    use std::fs;

    #[test]
    fn discovers_only_files_at_the_declared_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("A/B/C")).unwrap();
        fs::create_dir_all(root.join("A/B/D")).unwrap();
        fs::write(root.join("A/B/D/TRB.json"), "{}").unwrap();
        fs::write(root.join("A/B/C/TRA.json"), "{}").unwrap();
        fs::write(root.join("A/B/C/notes.txt"), "x").unwrap();
        fs::write(root.join("A/shallow.json"), "{}").unwrap();

        let files = discover_json_files(root, SONG_FILE_DEPTH).unwrap();

        assert_eq!(files, vec![root.join("A/B/C/TRA.json"), root.join("A/B/D/TRB.json")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = discover_json_files(&dir.path().join("nope"), LOG_FILE_DEPTH);

        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn reads_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(
            &path,
            "{\"page\": \"Home\", \"ts\": 1}\n\n{\"page\": \"NextSong\", \"ts\": 2}\n",
        )
        .unwrap();

        let records: Vec<EventRecord> = read_records(&[path], "log_data").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].page.as_deref(), Some("NextSong"));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.json");
        let bad = dir.path().join("b.json");
        fs::write(&good, r#"{"song_id": "S1"}"#).unwrap();
        fs::write(&bad, r#"{"song_id": "S2", "#).unwrap();

        let err = read_records::<SongRecord>(&[good, bad.clone()], "song_data").unwrap_err();

        match err {
            PipelineError::Json { path, .. } => assert_eq!(path, bad),
            other => panic!("erro inesperado: {other}"),
        }
    }
}
