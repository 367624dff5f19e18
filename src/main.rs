use std::io::Read;

use anyhow::{bail, Context, Result};

use callguard::scoring::HttpBackend;
use callguard::{AnalysisContext, EngineConfig, RiskEngine};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load().context("failed to load configuration")?;
    let backend = HttpBackend::from_config(&config.backend);
    let engine = RiskEngine::new(config, backend);

    let text = transcript_from_input()?;
    let result = engine.analyze(&text, &AnalysisContext::new().with_source("cli"));

    let json = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// Transcript from the arguments, or stdin when none are given
fn transcript_from_input() -> Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read transcript from stdin")?;
        buf
    } else {
        args.join(" ")
    };

    if text.trim().is_empty() {
        bail!("usage: callguard <transcript text>  (or pipe the transcript on stdin)");
    }
    Ok(text)
}
