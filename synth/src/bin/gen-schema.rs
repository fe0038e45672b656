use anyhow::Context;
use async_std::fs;
use clap::Parser;
use schema_synth::{build_schema, domain::Domain, init_logging};
use std::path::PathBuf;

/// Generate the GraphQL schema for a domain model.
#[derive(Parser)]
struct Options {
    /// The domain model, as a JSON file.
    #[clap(short, long, env = "SCHEMA_SYNTH_DOMAIN", name = "FILE")]
    domain: PathBuf,

    /// Write the schema to OUT instead of standard output.
    #[clap(short, long, env = "SCHEMA_SYNTH_OUT", name = "OUT")]
    out: Option<PathBuf>,
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();
    let opt = Options::parse();

    let config = fs::read_to_string(&opt.domain)
        .await
        .with_context(|| format!("reading {}", opt.domain.display()))?;
    let config = serde_json::from_str(&config)
        .with_context(|| format!("parsing {}", opt.domain.display()))?;
    let schema = build_schema(Domain::new(config)?)?;

    match opt.out {
        Some(out) => {
            fs::write(&out, schema.sdl()).await?;
            tracing::info!("wrote schema to {}", out.display());
        }
        None => println!("{}", schema.sdl()),
    }
    Ok(())
}
