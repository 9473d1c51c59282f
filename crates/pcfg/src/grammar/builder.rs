use crate::{
    ConfigReplacement, Error, Function, Grammar, Mapping, RankedValue, Replacement, Result,
    RuleSource, START, Section, SectionConfig,
};

/// Builds a [`Grammar`] depth-first from `START`.
///
/// A section referencing others is appended only after everything it
/// references has been built, so every reference can be recorded in the
/// [`Mapping`] as a concrete section index.
pub struct GrammarBuilder<'a, S: RuleSource + ?Sized> {
    source: &'a S,
    visited: Vec<String>,
    sections: Vec<Section>,
    mapping: Mapping,
}

impl<'a, S: RuleSource + ?Sized> GrammarBuilder<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            visited: Vec::new(),
            sections: Vec::new(),
            mapping: Mapping::default(),
        }
    }

    pub fn build(mut self) -> Result<Grammar> {
        self.visit(START)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Built grammar {} with {} sections",
            self.source.rule_name(),
            self.sections.len()
        );

        Grammar::from_parts(self.source.rule_name(), self.sections, self.mapping)
    }

    fn visit(&mut self, name: &str) -> Result<()> {
        if self.visited.iter().any(|v| v == name) {
            return Ok(());
        }
        self.visited.push(name.to_string());

        let config = self.source.section(name)?;
        if !config.is_terminal {
            for replacement in &config.replacements {
                self.visit(&replacement.config_id)?;
            }
            self.record_mapping(&config.replacements);
        }
        self.insert_sections(&config)
    }

    fn record_mapping(&mut self, replacements: &[ConfigReplacement]) {
        for replacement in replacements {
            self.mapping.reset(&replacement.transition_id);
            for (index, section) in self.sections.iter().enumerate() {
                if section.kind == replacement.config_id {
                    self.mapping
                        .insert(&replacement.transition_id, &section.name, index);
                }
            }
        }
    }

    fn insert_sections(&mut self, config: &SectionConfig) -> Result<()> {
        for file in &config.filenames {
            let name = file.strip_suffix(".txt").unwrap_or(file);
            let ranked = self.source.values(config, file)?;
            if ranked.is_empty() {
                return Err(Error::EmptySection {
                    kind: config.name.clone(),
                    name: name.to_string(),
                });
            }

            let replacements = match config.function {
                Function::Capitalization | Function::Copy | Function::Markov => {
                    collapse(config, name, &ranked, &[])?
                }
                Function::Shadow => {
                    let first = config.replacements.first().ok_or_else(|| {
                        Error::config(&config.name, "shadow section without a replacement")
                    })?;
                    let pos = self.mapping.get(&first.transition_id, name)?;
                    collapse(config, name, &ranked, &[pos])?
                }
                Function::Transparent => self.base_structures(config, name, &ranked)?,
            };

            self.sections
                .push(Section::new(config.name.as_str(), name, replacements));
        }
        Ok(())
    }

    fn base_structures(
        &self,
        config: &SectionConfig,
        name: &str,
        ranked: &[RankedValue],
    ) -> Result<Vec<Replacement>> {
        let mut last = f64::INFINITY;
        ranked
            .iter()
            .map(|line| {
                if line.probability > last {
                    return Err(Error::Unsorted {
                        kind: config.name.clone(),
                        name: name.to_string(),
                    });
                }
                last = line.probability;
                Ok(Replacement {
                    probability: line.probability,
                    is_terminal: config.is_terminal,
                    function: Function::Transparent,
                    values: vec![line.value.clone()],
                    pos: self.mapping.parse_base_structure(&line.value)?,
                })
            })
            .collect()
    }
}

/// Groups equal-probability lines into one replacement each.
fn collapse(
    config: &SectionConfig,
    name: &str,
    ranked: &[RankedValue],
    pos: &[usize],
) -> Result<Vec<Replacement>> {
    let mut replacements: Vec<Replacement> = Vec::new();
    for line in ranked {
        match replacements.last_mut() {
            Some(current) if line.probability == current.probability => {
                current.values.push(line.value.clone());
            }
            Some(current) if line.probability > current.probability => {
                return Err(Error::Unsorted {
                    kind: config.name.clone(),
                    name: name.to_string(),
                });
            }
            _ => replacements.push(Replacement {
                probability: line.probability,
                is_terminal: config.is_terminal,
                function: config.function,
                values: vec![line.value.clone()],
                pos: pos.to_vec(),
            }),
        }
    }
    Ok(replacements)
}

impl Grammar {
    /// Loads and validates a grammar from `source`.
    pub fn load<S: RuleSource + ?Sized>(source: &S) -> Result<Self> {
        GrammarBuilder::new(source).build()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory [`RuleSource`] keyed by section and file name.
    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub sections: HashMap<String, SectionConfig>,
        pub files: HashMap<String, Vec<(String, f64)>>,
    }

    impl MemorySource {
        pub fn with_section(
            mut self,
            name: &str,
            function: Function,
            is_terminal: bool,
            replacements: &[(&str, &str)],
            files: &[(&str, &[(&str, f64)])],
        ) -> Self {
            for (file, lines) in files {
                self.files.insert(
                    format!("{name}/{file}"),
                    lines.iter().map(|(v, p)| ((*v).to_string(), *p)).collect(),
                );
            }
            self.sections.insert(
                name.to_string(),
                SectionConfig {
                    name: name.to_string(),
                    is_terminal,
                    function,
                    directory: name.to_string(),
                    filenames: files.iter().map(|(f, _)| (*f).to_string()).collect(),
                    replacements: replacements
                        .iter()
                        .map(|(config_id, transition_id)| ConfigReplacement {
                            transition_id: (*transition_id).to_string(),
                            config_id: (*config_id).to_string(),
                        })
                        .collect(),
                },
            );
            self
        }
    }

    impl RuleSource for MemorySource {
        fn rule_name(&self) -> &str {
            "Memory"
        }

        fn section(&self, name: &str) -> Result<SectionConfig> {
            self.sections
                .get(name)
                .cloned()
                .ok_or_else(|| Error::config(name, "missing"))
        }

        fn values(&self, section: &SectionConfig, file: &str) -> Result<Vec<RankedValue>> {
            Ok(self.files[&format!("{}/{file}", section.name)]
                .iter()
                .map(|(value, probability)| RankedValue {
                    value: value.clone(),
                    probability: *probability,
                })
                .collect())
        }
    }

    /// `START -> D1 | A3D1`, digit lengths 1, words of length 3 shadowed
    /// by capitalisation masks of length 3.
    pub(crate) fn password_source() -> MemorySource {
        MemorySource::default()
            .with_section(
                "START",
                Function::Transparent,
                false,
                &[("BASE_A", "A"), ("BASE_D", "D")],
                &[("Grammar.txt", &[("A3D1", 0.7), ("D1", 0.3)])],
            )
            .with_section(
                "BASE_A",
                Function::Shadow,
                false,
                &[("CAPITALIZATION", "C")],
                &[("3.txt", &[("cat", 0.5), ("dog", 0.5), ("owl", 0.2)])],
            )
            .with_section(
                "CAPITALIZATION",
                Function::Capitalization,
                true,
                &[],
                &[("3.txt", &[("LLL", 0.8), ("ULL", 0.15), ("UUU", 0.05)])],
            )
            .with_section(
                "BASE_D",
                Function::Copy,
                true,
                &[],
                &[("1.txt", &[("1", 0.4), ("2", 0.35), ("3", 0.25)])],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemorySource, password_source};
    use super::*;

    #[test]
    fn builds_dependencies_before_dependants() {
        let grammar = Grammar::load(&password_source()).unwrap();
        let kinds: Vec<_> = grammar.sections().iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, ["CAPITALIZATION", "BASE_A", "BASE_D", "START"]);
        assert_eq!(grammar.start_index(), 3);
        assert_eq!(grammar.rule_name(), "Memory");

        assert_eq!(grammar.mapping().get("C", "3").unwrap(), 0);
        assert_eq!(grammar.mapping().get("A", "3").unwrap(), 1);
        assert_eq!(grammar.mapping().get("D", "1").unwrap(), 2);
    }

    #[test]
    fn ties_collapse_and_shadow_points_at_its_masks() {
        let grammar = Grammar::load(&password_source()).unwrap();
        let words = grammar.section(1).unwrap();
        assert_eq!(words.name, "3");
        assert_eq!(words.replacements.len(), 2);
        assert_eq!(words.replacements[0].values, ["cat", "dog"]);
        assert_eq!(words.replacements[0].pos, [0]);
        assert!(!words.replacements[0].is_terminal);

        let start = grammar.section(3).unwrap();
        assert_eq!(start.replacements[0].pos, [1, 2]);
        assert_eq!(start.replacements[1].pos, [2]);
    }

    #[test]
    fn unsorted_value_file_is_fatal() {
        let source = MemorySource::default().with_section(
            "START",
            Function::Copy,
            true,
            &[],
            &[("Grammar.txt", &[("a", 0.2), ("b", 0.7)])],
        );
        assert!(matches!(
            Grammar::load(&source),
            Err(Error::Unsorted { .. })
        ));
    }

    #[test]
    fn unresolved_base_structure_is_fatal() {
        let source = MemorySource::default()
            .with_section(
                "START",
                Function::Transparent,
                false,
                &[("BASE_D", "D")],
                &[("Grammar.txt", &[("D2", 1.0)])],
            )
            .with_section(
                "BASE_D",
                Function::Copy,
                true,
                &[],
                &[("1.txt", &[("1", 1.0)])],
            );
        assert!(matches!(
            Grammar::load(&source),
            Err(Error::MissingMapping { .. })
        ));
    }
}
