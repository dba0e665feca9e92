//! # Contratos de Schema
//!
//! Schemas fixos (versionados) dos registros brutos e das cinco tabelas do
//! modelo estrela. Nada aqui é inferido: uma mudança de campo exige
//! incrementar `SCHEMA_VERSION`.

use std::fmt;

use polars::prelude::*;
use serde::Deserialize;

/// Versão dos contratos entre etapas, gravada no marcador `_SUCCESS` de cada tabela.
pub const SCHEMA_VERSION: u32 = 1;

/// Registro bruto do catálogo (um objeto JSON por arquivo).
///
/// Campos ausentes viram `None`; um campo presente com tipo JSON incompatível
/// aborta a leitura (modo estrito).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SongRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub duration: Option<f64>,
    pub year: Option<i32>,
    pub num_songs: Option<i32>,
}

impl SongRecord {
    /// Converte os registros em um DataFrame colunar com os tipos do schema.
    pub fn to_frame(records: &[SongRecord]) -> PolarsResult<DataFrame> {
        df!(
            "song_id" => records.iter().map(|r| r.song_id.clone()).collect::<Vec<_>>(),
            "title" => records.iter().map(|r| r.title.clone()).collect::<Vec<_>>(),
            "artist_id" => records.iter().map(|r| r.artist_id.clone()).collect::<Vec<_>>(),
            "artist_name" => records.iter().map(|r| r.artist_name.clone()).collect::<Vec<_>>(),
            "artist_location" => records.iter().map(|r| r.artist_location.clone()).collect::<Vec<_>>(),
            "artist_latitude" => records.iter().map(|r| r.artist_latitude).collect::<Vec<_>>(),
            "artist_longitude" => records.iter().map(|r| r.artist_longitude).collect::<Vec<_>>(),
            "duration" => records.iter().map(|r| r.duration).collect::<Vec<_>>(),
            "year" => records.iter().map(|r| r.year).collect::<Vec<_>>(),
            "num_songs" => records.iter().map(|r| r.num_songs).collect::<Vec<_>>(),
        )
    }
}

/// Registro bruto do log de eventos (um objeto JSON por linha).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub artist: Option<String>,
    pub auth: Option<String>,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub item_in_session: Option<i64>,
    pub last_name: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub method: Option<String>,
    pub page: Option<String>,
    pub registration: Option<f64>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub status: Option<i64>,
    /// Epoch em milissegundos.
    pub ts: Option<i64>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
}

impl EventRecord {
    /// Converte os eventos em DataFrame mantendo os nomes de coluna originais do log.
    pub fn to_frame(records: &[EventRecord]) -> PolarsResult<DataFrame> {
        df!(
            "artist" => records.iter().map(|r| r.artist.clone()).collect::<Vec<_>>(),
            "auth" => records.iter().map(|r| r.auth.clone()).collect::<Vec<_>>(),
            "firstName" => records.iter().map(|r| r.first_name.clone()).collect::<Vec<_>>(),
            "gender" => records.iter().map(|r| r.gender.clone()).collect::<Vec<_>>(),
            "itemInSession" => records.iter().map(|r| r.item_in_session).collect::<Vec<_>>(),
            "lastName" => records.iter().map(|r| r.last_name.clone()).collect::<Vec<_>>(),
            "length" => records.iter().map(|r| r.length).collect::<Vec<_>>(),
            "level" => records.iter().map(|r| r.level.clone()).collect::<Vec<_>>(),
            "location" => records.iter().map(|r| r.location.clone()).collect::<Vec<_>>(),
            "method" => records.iter().map(|r| r.method.clone()).collect::<Vec<_>>(),
            "page" => records.iter().map(|r| r.page.clone()).collect::<Vec<_>>(),
            "registration" => records.iter().map(|r| r.registration).collect::<Vec<_>>(),
            "sessionId" => records.iter().map(|r| r.session_id).collect::<Vec<_>>(),
            "song" => records.iter().map(|r| r.song.clone()).collect::<Vec<_>>(),
            "status" => records.iter().map(|r| r.status).collect::<Vec<_>>(),
            "ts" => records.iter().map(|r| r.ts).collect::<Vec<_>>(),
            "userAgent" => records.iter().map(|r| r.user_agent.clone()).collect::<Vec<_>>(),
            "userId" => records.iter().map(|r| r.user_id.clone()).collect::<Vec<_>>(),
        )
    }
}

/// As cinco tabelas persistidas pelo pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl Table {
    /// Nome do diretório de destino sob a raiz de saída.
    pub fn dir_name(self) -> &'static str {
        match self {
            Table::Songs => "song",
            Table::Artists => "artist",
            Table::Users => "user",
            Table::Time => "time_table",
            Table::Songplays => "songplay",
        }
    }

    /// Chaves de particionamento física, na ordem dos níveis de diretório.
    pub fn partition_keys(self) -> &'static [&'static str] {
        match self {
            Table::Songs => &["year", "artist_id"],
            Table::Time | Table::Songplays => &["year", "month"],
            Table::Artists | Table::Users => &[],
        }
    }

    /// Colunas declaradas da tabela, na ordem em que são gravadas e relidas.
    pub fn columns(self) -> Vec<(&'static str, DataType)> {
        let start_time = DataType::Datetime(TimeUnit::Milliseconds, None);

        match self {
            Table::Songs => vec![
                ("song_id", DataType::String),
                ("title", DataType::String),
                ("artist_id", DataType::String),
                ("year", DataType::Int32),
                ("duration", DataType::Float64),
            ],
            Table::Artists => vec![
                ("artist_id", DataType::String),
                ("name", DataType::String),
                ("location", DataType::String),
                ("latitude", DataType::Float64),
                ("longitude", DataType::Float64),
            ],
            Table::Users => vec![
                ("userId", DataType::String),
                ("firstName", DataType::String),
                ("lastName", DataType::String),
                ("gender", DataType::String),
                ("level", DataType::String),
            ],
            Table::Time => vec![
                ("start_time", start_time),
                ("hour", DataType::Int32),
                ("day", DataType::Int32),
                ("week", DataType::Int32),
                ("month", DataType::Int32),
                ("year", DataType::Int32),
                ("weekday", DataType::Int32),
            ],
            Table::Songplays => vec![
                ("songplay_id", DataType::Int64),
                ("start_time", start_time),
                ("user_id", DataType::String),
                ("level", DataType::String),
                ("song_id", DataType::String),
                ("artist_id", DataType::String),
                ("session_id", DataType::Int64),
                ("location", DataType::String),
                ("user_agent", DataType::String),
                ("year", DataType::Int32),
                ("month", DataType::Int32),
            ],
        }
    }

    pub fn dtype_of(self, column: &str) -> Option<DataType> {
        self.columns()
            .into_iter()
            .find(|(name, _)| *name == column)
            .map(|(_, dtype)| dtype)
    }

    pub fn schema(self) -> Schema {
        Schema::from_iter(
            self.columns()
                .into_iter()
                .map(|(name, dtype)| Field::new(name.into(), dtype)),
        )
    }

    /// Tipos declarados das chaves de partição, usados para reler os diretórios.
    pub fn key_schema(self) -> Schema {
        Schema::from_iter(self.partition_keys().iter().filter_map(|key| {
            self.dtype_of(key)
                .map(|dtype| Field::new((*key).into(), dtype))
        }))
    }

    /// Projeção com cast estrito para o schema declarado.
    pub fn column_exprs(self) -> Vec<Expr> {
        self.columns()
            .into_iter()
            .map(|(name, dtype)| col(name).strict_cast(dtype))
            .collect()
    }

    /// Garante colunas, ordem e tipos declarados antes da escrita.
    pub fn conform(self, frame: &DataFrame) -> PolarsResult<DataFrame> {
        frame.clone().lazy().select(self.column_exprs()).collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
