//! Fixtures e leitores de coluna compartilhados pelos testes.

use std::fs;
use std::path::Path;

use polars::prelude::*;
use serde_json::{Value, json};

use crate::schema::Table;

pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

pub fn assert_table_schema(frame: &DataFrame, table: Table) {
    let (names, dtypes): (Vec<_>, Vec<_>) = table.columns().into_iter().unzip();

    assert_eq!(column_names(frame), names);
    assert_eq!(frame.dtypes(), dtypes);
}

pub fn strings(frame: &DataFrame, name: &str) -> Vec<Option<String>> {
    frame
        .column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect()
}

/// Valores inteiros (ou datetime físico em ms) convertidos para i64.
pub fn ints(frame: &DataFrame, name: &str) -> Vec<Option<i64>> {
    frame
        .column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

/// Grava um registro do catálogo em `song_data/<a>/<b>/<c>/<song_id>.json`.
pub fn write_song(input: &Path, song: &Value) {
    let song_id = song["song_id"].as_str().unwrap_or("unknown");
    let dir = input.join("song_data").join("A").join("B").join("C");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.json", song_id)), song.to_string()).unwrap();
}

pub fn song(song_id: &str, title: &str, artist_id: &str, artist_name: &str, year: i32, duration: f64) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": year
    })
}

/// Grava um arquivo de log com um evento por linha em `log_data/<name>`.
pub fn write_log(input: &Path, name: &str, events: &[Value]) {
    let dir = input.join("log_data");
    fs::create_dir_all(&dir).unwrap();

    let lines: Vec<String> = events.iter().map(Value::to_string).collect();
    fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
}

pub struct Play<'a> {
    pub page: &'a str,
    pub ts: i64,
    pub user_id: &'a str,
    pub level: &'a str,
    pub song: &'a str,
    pub artist: &'a str,
    pub length: f64,
}

impl Default for Play<'_> {
    fn default() -> Self {
        Self {
            page: "NextSong",
            ts: 1_541_990_258_796,
            user_id: "10",
            level: "free",
            song: "Fever",
            artist: "Peggy Lee",
            length: 200.0,
        }
    }
}

pub fn event(play: Play<'_>) -> Value {
    json!({
        "artist": play.artist,
        "auth": "Logged In",
        "firstName": "Sylvie",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Cruz",
        "length": play.length,
        "level": play.level,
        "location": "Washington-Arlington-Alexandria, DC-VA-MD-WV",
        "method": "PUT",
        "page": play.page,
        "registration": 1540266185796.0,
        "sessionId": 345,
        "song": play.song,
        "status": 200,
        "ts": play.ts,
        "userAgent": "Mozilla/5.0",
        "userId": play.user_id
    })
}
