//! # Fact Builder
//!
//! Resolve cada reprodução para uma música do catálogo e produz a tabela fato
//! `songplay`. A dimensão `song` usada no join é sempre a relida do armazenamento,
//! nunca a calculada em memória pelo Catalog Loader.

use std::time::Instant;

use polars::prelude::*;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::impl_errors::StageContext;
use crate::models::JoinStrategy;
use crate::pipeline::{PipelineContext, Stage};
use crate::schema::Table;
use crate::writer::{self, WriteSummary};

const EVENT_INDEX: &str = "event_idx";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinOptions {
    pub strategy: JoinStrategy,
    pub duration_tolerance_secs: f64,
}

/// Contagens do join, para registro em log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStats {
    pub events: usize,
    pub matched_events: usize,
    pub rows: usize,
}

impl JoinStats {
    pub fn unmatched_events(&self) -> usize {
        self.events - self.matched_events
    }

    /// Linhas extras geradas por títulos ambíguos.
    pub fn fan_out(&self) -> usize {
        self.rows - self.matched_events
    }
}

/// Produz a tabela fato a partir das reproduções e das dimensões relidas.
///
/// Com `JoinStrategy::Title` o join é interno por igualdade exata `song == title`:
/// eventos sem correspondência somem e títulos repetidos geram uma linha por música.
/// Com `JoinStrategy::Composite`, `artists` é obrigatório e o candidato precisa
/// também casar nome do artista e duração; eventos com zero ou vários candidatos
/// são descartados.
///
/// `songplay_id` é um identificador sequencial (a partir de 1) atribuído após ordenar
/// as linhas pela ordem dos eventos.
pub fn songplays_table(
    playbacks: &DataFrame,
    songs: &DataFrame,
    artists: Option<&DataFrame>,
    options: &JoinOptions,
) -> Result<(DataFrame, JoinStats), PipelineError> {
    let events = playbacks.clone().lazy().with_row_index(EVENT_INDEX, None);
    let catalog = songs.clone().lazy().select([
        col("song_id"),
        col("title"),
        col("artist_id"),
        col("duration"),
    ]);

    let candidates = events.join(
        catalog,
        [col("song")],
        [col("title")],
        JoinArgs::new(JoinType::Inner),
    );

    let matched = match options.strategy {
        JoinStrategy::Title => candidates,
        JoinStrategy::Composite => {
            let artists = artists.ok_or_else(|| {
                PipelineError::Schema(
                    "estratégia 'composite' exige a dimensão artist".to_string(),
                )
            })?;
            unambiguous(candidates, artists, options.duration_tolerance_secs)
        }
    };

    let matched = matched
        .sort_by_exprs(
            [col(EVENT_INDEX), col("song_id"), col("artist_id")],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let stats = JoinStats {
        events: playbacks.height(),
        matched_events: matched
            .column(EVENT_INDEX)?
            .as_materialized_series()
            .n_unique()?,
        rows: matched.height(),
    };

    let songplays = matched
        .lazy()
        .with_row_index("songplay_id", Some(1))
        .select([
            col("songplay_id").cast(DataType::Int64),
            col("start_time"),
            col("userId").alias("user_id"),
            col("level"),
            col("song_id"),
            col("artist_id"),
            col("sessionId").alias("session_id"),
            col("location"),
            col("userAgent").alias("user_agent"),
            col("year"),
            col("month"),
        ])
        .collect()?;

    Ok((songplays, stats))
}

/// Filtra candidatos por artista e duração e mantém apenas eventos com exatamente um.
fn unambiguous(candidates: LazyFrame, artists: &DataFrame, tolerance: f64) -> LazyFrame {
    let names = artists
        .clone()
        .lazy()
        .select([col("artist_id"), col("name")])
        .unique_stable(None, UniqueKeepStrategy::First);

    let confirmed = candidates
        .join(
            names,
            [col("artist_id")],
            [col("artist_id")],
            JoinArgs::new(JoinType::Inner),
        )
        .filter(
            col("artist").eq(col("name")).and(
                (col("length") - col("duration"))
                    .abs()
                    .lt_eq(lit(tolerance)),
            ),
        );

    let counts = confirmed
        .clone()
        .group_by([col(EVENT_INDEX)])
        .agg([len().alias("candidates")]);

    confirmed
        .join(
            counts,
            [col(EVENT_INDEX)],
            [col(EVENT_INDEX)],
            JoinArgs::new(JoinType::Inner),
        )
        .filter(col("candidates").eq(lit(1)))
}

/// Etapa completa: relê `song` (e `artist`, se necessário) e grava `songplay`.
pub fn process_songplays(
    ctx: &PipelineContext,
    playbacks: &DataFrame,
) -> Result<WriteSummary, PipelineError> {
    let stage = Stage::FactBuilder;
    let options = ctx.join_options();

    let songs = writer::read_table(Table::Songs, ctx.output_root()).in_table(stage, Table::Songs)?;
    let artists = match options.strategy {
        JoinStrategy::Title => None,
        JoinStrategy::Composite => Some(
            writer::read_table(Table::Artists, ctx.output_root())
                .in_table(stage, Table::Artists)?,
        ),
    };

    let timer = Instant::now();
    info!("Criando tabela '{}' ({:?})", Table::Songplays, options.strategy);
    let (songplays, stats) = songplays_table(playbacks, &songs, artists.as_ref(), &options)
        .in_table(stage, Table::Songplays)?;

    info!(
        "'{}': {} linhas de {} reproduções ({:.2?})",
        Table::Songplays,
        stats.rows,
        stats.events,
        timer.elapsed()
    );
    if stats.unmatched_events() > 0 {
        info!("{} reproduções sem música correspondente descartadas", stats.unmatched_events());
    }
    if stats.fan_out() > 0 {
        warn!("{} linhas extras por títulos ambíguos no catálogo", stats.fan_out());
    }

    writer::write_table(Table::Songplays, &songplays, ctx.output_root(), &ctx.write_options())
        .in_table(stage, Table::Songplays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::playback_events;
    use crate::schema::EventRecord;
    use crate::test_support::{Play, assert_table_schema, event, ints, strings};

    fn title_only() -> JoinOptions {
        JoinOptions {
            strategy: JoinStrategy::Title,
            duration_tolerance_secs: 2.0,
        }
    }

    fn composite() -> JoinOptions {
        JoinOptions {
            strategy: JoinStrategy::Composite,
            duration_tolerance_secs: 2.0,
        }
    }

    fn playbacks(plays: Vec<Play<'static>>) -> DataFrame {
        let records: Vec<EventRecord> = plays
            .into_iter()
            .map(|play| serde_json::from_value(event(play)).unwrap())
            .collect();

        playback_events(&EventRecord::to_frame(&records).unwrap()).unwrap()
    }

    fn songs() -> DataFrame {
        df!(
            "song_id" => ["S1", "S2", "S3"],
            "title" => ["Fever", "Fever", "Halo"],
            "artist_id" => ["A1", "A2", "A3"],
            "year" => [1958i32, 1960, 2008],
            "duration" => [200.0f64, 190.0, 261.0],
        )
        .unwrap()
    }

    fn artists() -> DataFrame {
        df!(
            "artist_id" => ["A1", "A2", "A3"],
            "name" => ["Peggy Lee", "La Lupe", "Beyoncé"],
            "location" => [None::<&str>, None, None],
            "latitude" => [None::<f64>, None, None],
            "longitude" => [None::<f64>, None, None],
        )
        .unwrap()
    }

    #[test]
    fn exact_title_resolves_song_and_artist() {
        let catalog = df!(
            "song_id" => ["S1"],
            "title" => ["Fever"],
            "artist_id" => ["A1"],
            "year" => [1958i32],
            "duration" => [200.0f64],
        )
        .unwrap();
        let events = playbacks(vec![
            Play::default(),
            Play { song: "Unknown Title", ts: 1_542_069_637_796, ..Default::default() },
        ]);

        let (facts, stats) = songplays_table(&events, &catalog, None, &title_only()).unwrap();

        assert_table_schema(&facts, Table::Songplays);
        assert_eq!(strings(&facts, "song_id"), vec![Some("S1".to_string())]);
        assert_eq!(strings(&facts, "artist_id"), vec![Some("A1".to_string())]);
        assert_eq!(strings(&facts, "user_id"), vec![Some("10".to_string())]);
        assert_eq!(ints(&facts, "session_id"), vec![Some(345)]);
        assert_eq!(ints(&facts, "month"), vec![Some(11)]);
        assert_eq!(stats.unmatched_events(), 1);
    }

    #[test]
    fn title_join_fans_out_on_duplicate_titles() {
        let events = playbacks(vec![Play::default()]);

        let (facts, stats) = songplays_table(&events, &songs(), None, &title_only()).unwrap();

        assert_eq!(
            strings(&facts, "song_id"),
            vec![Some("S1".to_string()), Some("S2".to_string())]
        );
        assert_eq!(stats.fan_out(), 1);
    }

    #[test]
    fn songplay_ids_are_distinct_per_row() {
        let events = playbacks(vec![
            Play { ts: 1_541_903_636_796, ..Default::default() },
            Play { ts: 1_541_990_258_796, ..Default::default() },
            Play { song: "Halo", ts: 1_542_069_637_796, ..Default::default() },
        ]);

        let (facts, _) = songplays_table(&events, &songs(), None, &title_only()).unwrap();

        assert_eq!(
            ints(&facts, "songplay_id"),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
        );
        assert_eq!(
            strings(&facts, "song_id"),
            vec![
                Some("S1".to_string()),
                Some("S2".to_string()),
                Some("S1".to_string()),
                Some("S2".to_string()),
                Some("S3".to_string()),
            ]
        );
    }

    #[test]
    fn composite_join_uses_artist_and_duration() {
        let events = playbacks(vec![
            Play { artist: "La Lupe", length: 191.0, ..Default::default() },
            Play { artist: "La Lupe", length: 230.0, ts: 1_542_069_637_796, ..Default::default() },
        ]);

        let (facts, stats) =
            songplays_table(&events, &songs(), Some(&artists()), &composite()).unwrap();

        assert_eq!(strings(&facts, "song_id"), vec![Some("S2".to_string())]);
        assert_eq!(stats.fan_out(), 0);
        assert_eq!(stats.unmatched_events(), 1);
    }

    #[test]
    fn composite_join_drops_ambiguous_events() {
        let catalog = df!(
            "song_id" => ["S1", "S9"],
            "title" => ["Fever", "Fever"],
            "artist_id" => ["A1", "A1"],
            "year" => [1958i32, 1959],
            "duration" => [200.0f64, 200.5],
        )
        .unwrap();
        let events = playbacks(vec![Play::default()]);

        let (facts, stats) =
            songplays_table(&events, &catalog, Some(&artists()), &composite()).unwrap();

        assert_eq!(facts.height(), 0);
        assert_eq!(stats.unmatched_events(), 1);
    }

    #[test]
    fn composite_join_requires_artists() {
        let events = playbacks(vec![Play::default()]);

        let result = songplays_table(&events, &songs(), None, &composite());

        assert!(matches!(result, Err(PipelineError::Schema(_))));
    }

    #[test]
    fn no_playbacks_yield_an_empty_fact_table() {
        let events = playbacks(vec![Play { page: "Home", ..Default::default() }]);

        let (facts, stats) = songplays_table(&events, &songs(), None, &title_only()).unwrap();

        assert_eq!(facts.height(), 0);
        assert_eq!(stats.events, 0);
        assert_table_schema(&Table::Songplays.conform(&facts).unwrap(), Table::Songplays);
    }
}
