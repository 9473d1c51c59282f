//! Single-machine generation: load a rule set and print guesses in
//! probability order.

use super::config::LocalConfig;
use anyhow::Context;
use pcfg::{GenerateOptions, Generator, Grammar, RuleDirectory};
use std::{
    io::{self, Write},
    sync::Arc,
    time::Instant,
};

/// Bytes a [`StdoutSink`] buffers before taking the stdout lock.
const SINK_CAPACITY: usize = 64 * 1024;

/// Per-thread stdout writer. Output is only ever written while holding the
/// stdout lock and always ends on a line boundary, so lines from different
/// threads never interleave.
#[derive(Debug, Default)]
pub struct StdoutSink {
    buffer: Vec<u8>,
}

impl Write for StdoutSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= SINK_CAPACITY && self.buffer.ends_with(b"\n") {
            self.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        out.write_all(&self.buffer)?;
        out.flush()?;
        self.buffer.clear();
        Ok(())
    }
}

pub fn run(config: LocalConfig) -> anyhow::Result<()> {
    let rules = RuleDirectory::open(&config.rules_dir, &config.rule_name)
        .with_context(|| format!("opening rule set {:?}", config.rule_name))?;
    let grammar = Arc::new(Grammar::load(&rules).context("loading grammar")?);

    let started = Instant::now();
    let mut generator = Generator::new(grammar)?;
    let options = GenerateOptions {
        workers: config.threads,
        max_guesses: config.max_guesses,
    };
    let generated = generator.run(&options, |_| StdoutSink::default())?;

    tracing::info!(
        generated,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Local generation finished"
    );
    Ok(())
}
