use crate::{Error, Function, Result};
use ini::{Ini, ParseOption};
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

/// A structural reference from a non-terminal section to another section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ConfigReplacement {
    #[serde(rename = "Transition_id")]
    pub transition_id: String,
    #[serde(rename = "Config_id")]
    pub config_id: String,
}

/// The structural description of one grammar symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionConfig {
    pub name: String,
    pub is_terminal: bool,
    pub function: Function,
    pub directory: String,
    pub filenames: Vec<String>,
    pub replacements: Vec<ConfigReplacement>,
}

/// One `value<TAB>probability` line of a value file.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedValue {
    pub value: String,
    pub probability: f64,
}

/// Where a [`crate::GrammarBuilder`] reads section configs and value files
/// from.
pub trait RuleSource {
    fn rule_name(&self) -> &str;

    /// Returns the structural config of the section called `name`.
    fn section(&self, name: &str) -> Result<SectionConfig>;

    /// Returns the ranked values of `file`, one of `section.filenames`.
    fn values(&self, section: &SectionConfig, file: &str) -> Result<Vec<RankedValue>>;
}

/// A rule set on disk: `<rules_dir>/<rule_name>/config.ini` plus one value
/// file per section sub-category.
#[derive(Debug)]
pub struct RuleDirectory {
    root: PathBuf,
    rule_name: String,
    config: Ini,
}

impl RuleDirectory {
    pub fn open(rules_dir: impl AsRef<Path>, rule_name: &str) -> Result<Self> {
        let root = rules_dir.as_ref().join(rule_name);
        let config_path = root.join("config.ini");
        // Replacement lists are JSON; quote and escape handling would mangle
        // them.
        let opts = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let config = Ini::load_from_file_opt(&config_path, opts).map_err(|e| match e {
            ini::Error::Io(source) => Error::Io {
                path: config_path.clone(),
                source,
            },
            ini::Error::Parse(e) => Error::config("config.ini", e.to_string()),
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!("Loaded {}", config_path.display());

        Ok(Self {
            root,
            rule_name: rule_name.to_string(),
            config,
        })
    }
}

impl RuleSource for RuleDirectory {
    fn rule_name(&self) -> &str {
        &self.rule_name
    }

    fn section(&self, name: &str) -> Result<SectionConfig> {
        let props = self
            .config
            .section(Some(name))
            .ok_or_else(|| Error::config(name, "missing from config.ini"))?;
        let key = |k: &str| {
            props
                .get(k)
                .ok_or_else(|| Error::config(name, format!("missing key `{k}`")))
        };

        let is_terminal = parse_bool(key("is_terminal")?)
            .ok_or_else(|| Error::config(name, "`is_terminal` is not a boolean"))?;
        let function = key("function")?.parse()?;
        let directory = props.get("directory").unwrap_or_default().to_string();
        let filenames = parse_list(key("filenames")?)
            .map_err(|e| Error::config(name, format!("bad `filenames`: {e}")))?;
        let replacements = match props.get("replacements") {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| Error::config(name, format!("bad `replacements`: {e}")))?,
            None if is_terminal => Vec::new(),
            None => return Err(Error::config(name, "non-terminal without `replacements`")),
        };

        Ok(SectionConfig {
            name: name.to_string(),
            is_terminal,
            function,
            directory,
            filenames,
            replacements,
        })
    }

    fn values(&self, section: &SectionConfig, file: &str) -> Result<Vec<RankedValue>> {
        let path = self.root.join(&section.directory).join(file);
        let f = File::open(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        parse_values(&path, BufReader::new(f))
    }
}

/// Parses `value<TAB>probability` lines. Blank lines are skipped.
pub fn parse_values(path: &Path, reader: impl BufRead) -> Result<Vec<RankedValue>> {
    let mut values = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let (Some(value), Some(raw), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(Error::ValueLine {
                path: path.to_path_buf(),
                line: i + 1,
            });
        };
        let probability = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| *p > 0.0 && *p <= 1.0)
            .ok_or_else(|| Error::Probability {
                path: path.to_path_buf(),
                line: i + 1,
                raw: raw.to_string(),
            })?;

        values.push(RankedValue {
            value: value.to_string(),
            probability,
        });
    }
    Ok(values)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parses a list literal of quoted strings, as JSON or Python writes it
/// (`["a.txt"]`, `['a.txt']`). The other quote character may appear inside
/// an element, and a backslash escapes the next character.
fn parse_list(raw: &str) -> core::result::Result<Vec<String>, &'static str> {
    let body = raw
        .trim()
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or("expected a `[...]` list")?;

    let mut items = Vec::new();
    let mut chars = body.chars();
    loop {
        let quote = match chars.find(|c| !c.is_whitespace() && *c != ',') {
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return Err("list elements must be quoted"),
            None => return Ok(items),
        };
        let mut item = String::new();
        loop {
            match chars.next() {
                Some('\\') => item.extend(chars.next()),
                Some(c) if c == quote => break,
                Some(c) => item.push(c),
                None => return Err("unterminated string"),
            }
        }
        items.push(item);
    }
}
