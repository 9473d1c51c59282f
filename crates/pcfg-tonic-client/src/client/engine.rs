//! The external cracking engine.
//!
//! One engine process runs per chunk: guesses are streamed to its stdin and
//! recovered `target:plaintext` pairs are read back from its outfile once
//! it exits.

use pcfg::{Grammar, GuessGenerator, TreeItem};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

/// Exit codes the engine uses for a finished run: 0 when something was
/// cracked, 1 when the input was exhausted without a crack.
const ACCEPTED_EXIT_CODES: [i32; 2] = [0, 1];

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("failed to start {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("engine i/o failed: {0}")]
    Io(#[from] io::Error),

    /// `code` is `None` when the process was killed by a signal.
    #[error("engine exited with status {code:?}")]
    ExitStatus { code: Option<i32> },

    #[error(transparent)]
    Grammar(#[from] pcfg::Error),
}

/// A configured hashcat invocation.
#[derive(Debug, Clone)]
pub struct Hashcat {
    binary: PathBuf,
    mode: String,
    hash_file: PathBuf,
    outfile: PathBuf,
}

impl Hashcat {
    pub fn new(binary: PathBuf, mode: String, hash_file: PathBuf, outfile: PathBuf) -> Self {
        Self {
            binary,
            mode,
            hash_file,
            outfile,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.mode)
            .arg("-o")
            .arg(&self.outfile)
            .arg("--machine-readable")
            .arg("--status")
            .arg(&self.hash_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Runs the engine over every guess of `items` and returns what it
    /// recovered. Blocks until the process exits.
    pub fn crack(
        &self,
        grammar: &Grammar,
        items: &[TreeItem],
    ) -> Result<HashMap<String, String>, EngineError> {
        // Results from an earlier chunk must not be reported twice.
        remove_if_exists(&self.outfile)?;

        let mut child = self.command().spawn().map_err(|source| EngineError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        let fed = feed(&mut child, grammar, items);
        // Wait even if feeding failed so the process is reaped.
        let status = child.wait()?;

        match fed {
            Ok(written) => tracing::debug!(written, "Fed engine"),
            // The engine may stop reading early, e.g. once every target is
            // cracked.
            Err(EngineError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!("Engine closed its input early");
            }
            Err(e) => return Err(e),
        }

        match status.code() {
            Some(code) if ACCEPTED_EXIT_CODES.contains(&code) => Ok(read_results(&self.outfile)?),
            code => Err(EngineError::ExitStatus { code }),
        }
    }
}

/// Streams every guess into the child's stdin and closes it.
fn feed(child: &mut Child, grammar: &Grammar, items: &[TreeItem]) -> Result<u64, EngineError> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("engine stdin was not captured"))?;
    let mut pipe = BufWriter::new(stdin);
    let mut written = 0;
    for tree in items {
        written += GuessGenerator::new(grammar, tree)?.write_to(&mut pipe)?;
    }
    pipe.flush()?;
    Ok(written)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Parses an engine outfile of `target:plaintext` lines. The split is at the
/// first `:` so plaintexts may contain colons. Malformed lines are skipped
/// and a missing file means nothing was recovered.
pub fn read_results(path: &Path) -> io::Result<HashMap<String, String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e),
    };

    let mut results = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        match line.split_once(':') {
            Some((target, plaintext)) if !target.is_empty() => {
                results.insert(target.to_string(), plaintext.to_string());
            }
            _ => tracing::debug!(line = %line, "Skipping malformed result line"),
        }
    }
    Ok(results)
}
