//! # Song Plays Star-Schema Pipeline
//!
//! ## Visão Geral
//! Converte o catálogo bruto de músicas e os logs de eventos de reprodução em um
//! modelo estrela (`song`, `artist`, `user`, `time_table`, `songplay`) gravado
//! em Parquet particionado, via Polars.
//!
//! ## Princípios de Engenharia
//! - **Fail-Fast**: Qualquer falha de etapa aborta a execução com contexto (etapa, tabela).
//! - **Idempotência**: Toda tabela é sobrescrita por inteiro; repetir a execução é seguro.
//! - **Observabilidade**: Logs com tempos de execução por etapa e por tabela.

mod catalog;
mod errors;
mod events;
mod facts;
mod impl_errors;
mod models;
mod pipeline;
mod schema;
mod source;
mod writer;

#[cfg(test)]
mod test_support;

use std::env;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::models::Config;
use crate::pipeline::PipelineContext;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let global_timer = Instant::now();
    info!("--- INICIANDO ETL PIPELINE ---");

    // Carrega configuração TOML (permite passar caminho via CLI)
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "pipeline.toml".to_string());

    let config = match Config::load_from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Erro na carga de configuração: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = PipelineContext::create(config)?;

    // Libera o contexto (e o staging remanescente) também em caso de falha
    let summary = match pipeline::execute(ctx) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Pipeline abortado: {}", e);
            std::process::exit(1);
        }
    };

    for table in &summary.tables {
        info!(
            "{:<10} {:>8} linhas {:>5} partições  {}",
            table.table.to_string(),
            table.rows,
            table.partitions,
            table.path.display()
        );
    }

    info!("==========================================");
    info!("Fim da transformação");
    info!("Tempo de execução: {:.2?}", global_timer.elapsed());
    info!("==========================================");

    Ok(())
}
