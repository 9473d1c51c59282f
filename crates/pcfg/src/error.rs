use std::path::PathBuf;

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the grammar loader and enumeration engine can produce.
///
/// Everything except [`Error::IndexOutOfRange`] is a load-time failure and
/// is fatal at start-up. [`Error::IndexOutOfRange`] means a tree and the
/// grammar it is evaluated against are out of sync; it is never a condition
/// to retry. Running out of structures is not an error at all, see
/// [`crate::PcfgQueue::next`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Reading a config or value file failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value file line is not `value<TAB>probability`.
    #[error("{}:{line}: expected `value<TAB>probability`", path.display())]
    ValueLine { path: PathBuf, line: usize },

    /// The probability column could not be parsed or is outside (0, 1].
    #[error("{}:{line}: invalid probability {raw:?}", path.display())]
    Probability {
        path: PathBuf,
        line: usize,
        raw: String,
    },

    /// Replacements are not in descending probability order.
    #[error("section {kind}/{name} is not in descending probability order")]
    Unsorted { kind: String, name: String },

    /// A section, or one of its replacements, has no values.
    #[error("section {kind}/{name} has no replacement values")]
    EmptySection { kind: String, name: String },

    /// The `function` tag of a section is not one of the known functions.
    #[error("unknown replacement function {0:?}")]
    UnknownFunction(String),

    /// A transition id / sub-category pair has no mapping entry.
    #[error("no grammar mapping for {id:?}/{name:?}")]
    MissingMapping { id: String, name: String },

    /// A base structure string could not be decomposed into sections.
    #[error("cannot parse base structure {0:?}")]
    BaseStructure(String),

    /// The grammar has no `START` section.
    #[error("grammar has no START section")]
    MissingStart,

    /// A section of the structural config is missing or malformed.
    #[error("config section {section:?}: {reason}")]
    Config { section: String, reason: String },

    /// A tree node points outside the grammar.
    #[error("tree node ({index}, {transition}) is out of range for the grammar")]
    IndexOutOfRange { index: usize, transition: usize },

    /// Writing guesses to an output sink failed.
    #[error("failed to write guesses: {0}")]
    Sink(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn config(section: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            section: section.to_string(),
            reason: reason.into(),
        }
    }
}
