use crate::{Error, Result, TreeItem};
use core::{fmt, str::FromStr};
use std::collections::BTreeMap;

/// The `Type` of the section every enumeration starts from.
pub const START: &str = "START";

/// How the values of a [`Replacement`] are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    /// Capitalisation masks (`U`/`L` per character) applied to a word.
    Capitalization,
    /// Literal values copied into the guess.
    Copy,
    /// Dictionary words whose casing comes from a capitalisation child.
    Shadow,
    /// Markov-model continuations, copied into the guess.
    Markov,
    /// Base structures; the node is replaced by its children.
    Transparent,
}

impl Function {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capitalization => "Capitalization",
            Self::Copy => "Copy",
            Self::Shadow => "Shadow",
            Self::Markov => "Markov",
            Self::Transparent => "Transparent",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Function {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Capitalization" => Ok(Self::Capitalization),
            "Copy" => Ok(Self::Copy),
            "Shadow" => Ok(Self::Shadow),
            "Markov" => Ok(Self::Markov),
            "Transparent" => Ok(Self::Transparent),
            other => Err(Error::UnknownFunction(other.to_string())),
        }
    }
}

/// One probability-ranked choice within a [`Section`].
///
/// All `values` share `probability`; ties in the value file collapse into a
/// single replacement. `pos` lists the sections a structural replacement
/// expands into and is empty for terminals.
#[derive(Clone, Debug, PartialEq)]
pub struct Replacement {
    pub probability: f64,
    pub is_terminal: bool,
    pub function: Function,
    pub values: Vec<String>,
    pub pos: Vec<usize>,
}

impl Replacement {
    pub fn terminal<I, V>(probability: f64, function: Function, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            probability,
            is_terminal: true,
            function,
            values: values.into_iter().map(Into::into).collect(),
            pos: Vec::new(),
        }
    }

    pub fn structural<I, V>(
        probability: f64,
        function: Function,
        values: I,
        pos: impl Into<Vec<usize>>,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            probability,
            is_terminal: false,
            function,
            values: values.into_iter().map(Into::into).collect(),
            pos: pos.into(),
        }
    }
}

/// A grammar symbol (`kind`) for one sub-category (`name`), with its
/// replacements sorted by descending probability.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub kind: String,
    pub name: String,
    pub replacements: Vec<Replacement>,
}

impl Section {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        replacements: Vec<Replacement>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            replacements,
        }
    }
}

/// Resolves `(transition id, sub-category name)` to a section index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mapping(BTreeMap<String, BTreeMap<String, usize>>);

impl Mapping {
    pub fn get(&self, id: &str, name: &str) -> Result<usize> {
        self.0
            .get(id)
            .and_then(|names| names.get(name))
            .copied()
            .ok_or_else(|| Error::MissingMapping {
                id: id.to_string(),
                name: name.to_string(),
            })
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>, index: usize) {
        self.0
            .entry(id.into())
            .or_default()
            .insert(name.into(), index);
    }

    /// Drops every entry recorded for `id` so it can be rebuilt.
    pub(crate) fn reset(&mut self, id: &str) {
        self.0.insert(id.to_string(), BTreeMap::new());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, usize>)> {
        self.0.iter().map(|(id, names)| (id.as_str(), names))
    }

    /// Decomposes a base structure such as `"A3D2"` into section indices.
    ///
    /// The name splits before every upper-case letter; each token is a
    /// symbol character followed by a length. `"M"` alone names the Markov
    /// probability section.
    pub fn parse_base_structure(&self, base: &str) -> Result<Vec<usize>> {
        if base == "M" {
            return Ok(vec![self.get("M", "markov_prob")?]);
        }
        if base.is_empty() {
            return Err(Error::BaseStructure(base.to_string()));
        }

        let mut starts: Vec<usize> = base
            .char_indices()
            .skip(1)
            .filter(|(_, c)| c.is_uppercase())
            .map(|(i, _)| i)
            .collect();
        starts.insert(0, 0);
        starts.push(base.len());

        starts
            .windows(2)
            .map(|w| {
                let token = &base[w[0]..w[1]];
                let mut chars = token.chars();
                let symbol = chars
                    .next()
                    .ok_or_else(|| Error::BaseStructure(base.to_string()))?;
                self.get(&symbol.to_string(), chars.as_str())
            })
            .collect()
    }
}

impl FromIterator<(String, BTreeMap<String, usize>)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (String, BTreeMap<String, usize>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An immutable, validated probabilistic context-free grammar.
#[derive(Clone, Debug, PartialEq)]
pub struct Grammar {
    rule_name: String,
    sections: Vec<Section>,
    mapping: Mapping,
    start: usize,
}

impl Grammar {
    /// Assembles a grammar from already-built parts, checking every
    /// structural invariant the engine relies on.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptySection`] for a section or replacement without values.
    /// - [`Error::Unsorted`] when probabilities increase within a section.
    /// - [`Error::Config`] for probabilities outside (0, 1] or a `pos` index
    ///   that does not name a section.
    /// - [`Error::MissingStart`] without a `START` section.
    pub fn from_parts(
        rule_name: impl Into<String>,
        sections: Vec<Section>,
        mapping: Mapping,
    ) -> Result<Self> {
        for section in &sections {
            validate_section(section, sections.len())?;
        }
        let start = find_start(&sections).ok_or(Error::MissingStart)?;
        Ok(Self {
            rule_name: rule_name.into(),
            sections,
            mapping,
            start,
        })
    }

    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Index of the `START` section.
    pub const fn start_index(&self) -> usize {
        self.start
    }

    pub fn section(&self, index: usize) -> Result<&Section> {
        self.sections.get(index).ok_or(Error::IndexOutOfRange {
            index,
            transition: 0,
        })
    }

    pub fn replacement(&self, index: usize, transition: usize) -> Result<&Replacement> {
        self.sections
            .get(index)
            .and_then(|s| s.replacements.get(transition))
            .ok_or(Error::IndexOutOfRange { index, transition })
    }

    pub fn parse_base_structure(&self, base: &str) -> Result<Vec<usize>> {
        self.mapping.parse_base_structure(base)
    }

    /// Checks that every node of `tree` addresses an existing replacement.
    pub fn validate_tree(&self, tree: &TreeItem) -> Result<()> {
        self.replacement(tree.index, tree.transition)?;
        tree.children
            .iter()
            .try_for_each(|child| self.validate_tree(child))
    }
}

fn find_start(sections: &[Section]) -> Option<usize> {
    match sections.last() {
        Some(last) if last.kind == START => Some(sections.len() - 1),
        _ => sections.iter().position(|s| s.kind == START),
    }
}

fn validate_section(section: &Section, num_sections: usize) -> Result<()> {
    let empty = || Error::EmptySection {
        kind: section.kind.clone(),
        name: section.name.clone(),
    };
    if section.replacements.is_empty() {
        return Err(empty());
    }

    let mut last = f64::INFINITY;
    for replacement in &section.replacements {
        if replacement.values.is_empty() {
            return Err(empty());
        }
        let p = replacement.probability;
        if !(p > 0.0 && p <= 1.0) {
            return Err(Error::config(
                &section.kind,
                format!("probability {p} of {} is outside (0, 1]", section.name),
            ));
        }
        if p > last {
            return Err(Error::Unsorted {
                kind: section.kind.clone(),
                name: section.name.clone(),
            });
        }
        last = p;

        if let Some(&bad) = replacement.pos.iter().find(|&&i| i >= num_sections) {
            return Err(Error::config(
                &section.kind,
                format!("{} expands into unknown section {bad}", section.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(name: &str, probs: &[f64]) -> Section {
        Section::new(
            "BASE_D",
            name,
            probs
                .iter()
                .enumerate()
                .map(|(i, &p)| Replacement::terminal(p, Function::Copy, [i.to_string()]))
                .collect(),
        )
    }

    #[test]
    fn function_tags_round_trip_through_strings() {
        for f in [
            Function::Capitalization,
            Function::Copy,
            Function::Shadow,
            Function::Markov,
            Function::Transparent,
        ] {
            assert_eq!(f.as_str().parse::<Function>().unwrap(), f);
        }
        assert!(matches!(
            "Keyboard".parse::<Function>(),
            Err(Error::UnknownFunction(tag)) if tag == "Keyboard"
        ));
    }

    #[test]
    fn base_structure_splits_on_upper_case_symbols() {
        let mut mapping = Mapping::default();
        mapping.insert("A", "3", 4);
        mapping.insert("D", "2", 1);
        mapping.insert("D", "12", 7);
        mapping.insert("M", "markov_prob", 9);

        assert_eq!(mapping.parse_base_structure("A3D2").unwrap(), [4, 1]);
        assert_eq!(mapping.parse_base_structure("D12A3").unwrap(), [7, 4]);
        assert_eq!(mapping.parse_base_structure("M").unwrap(), [9]);
        assert!(matches!(
            mapping.parse_base_structure("A4"),
            Err(Error::MissingMapping { id, name }) if id == "A" && name == "4"
        ));
        assert!(matches!(
            mapping.parse_base_structure(""),
            Err(Error::BaseStructure(_))
        ));
    }

    #[test]
    fn start_prefers_the_last_section() {
        let start = Section::new(
            START,
            "Grammar",
            vec![Replacement::structural(1.0, Function::Transparent, ["D1"], [0])],
        );
        let grammar =
            Grammar::from_parts("r", vec![digits("1", &[0.5, 0.5]), start], Mapping::default())
                .unwrap();
        assert_eq!(grammar.start_index(), 1);
    }

    #[test]
    fn rejects_increasing_probabilities() {
        let start = digits("1", &[0.2, 0.3]);
        let start = Section { kind: START.into(), ..start };
        assert!(matches!(
            Grammar::from_parts("r", vec![start], Mapping::default()),
            Err(Error::Unsorted { .. })
        ));
    }

    #[test]
    fn rejects_dangling_positions_and_missing_start() {
        let start = Section::new(
            START,
            "Grammar",
            vec![Replacement::structural(1.0, Function::Transparent, ["D1"], [3])],
        );
        assert!(matches!(
            Grammar::from_parts("r", vec![start], Mapping::default()),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            Grammar::from_parts("r", vec![digits("1", &[1.0])], Mapping::default()),
            Err(Error::MissingStart)
        ));
    }

    #[test]
    fn validate_tree_reports_the_offending_node() {
        let start = Section {
            kind: START.into(),
            ..digits("1", &[0.6, 0.4])
        };
        let grammar = Grammar::from_parts("r", vec![start], Mapping::default()).unwrap();
        assert!(grammar.validate_tree(&TreeItem::new(0, 1, Vec::new())).is_ok());
        assert!(matches!(
            grammar.validate_tree(&TreeItem::new(0, 2, Vec::new())),
            Err(Error::IndexOutOfRange {
                index: 0,
                transition: 2
            })
        ));
    }
}
