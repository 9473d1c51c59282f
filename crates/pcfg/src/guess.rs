//! Expansion of one pre-terminal structure into concrete guesses.
//!
//! The structure's leaves are flattened, left to right, into "digits": one
//! list of candidate values per leaf. The guesses are the cross product of
//! those lists, walked like an odometer with the rightmost digit turning
//! fastest, so nothing but the current position is ever held in memory.

use crate::{Function, Grammar, Result, TreeItem};
use std::io::{self, Write};

#[derive(Debug)]
enum Slot {
    Literal(usize),
    /// A word digit and the capitalisation mask digits applied to it.
    Word { word: usize, masks: Vec<usize> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Fresh,
    Running,
    Done,
}

/// A lazy, finite, restartable sequence of the guesses of one structure.
#[derive(Debug)]
pub struct GuessGenerator<'g> {
    digits: Vec<&'g [String]>,
    slots: Vec<Slot>,
    odometer: Vec<usize>,
    state: State,
}

impl<'g> GuessGenerator<'g> {
    /// # Errors
    ///
    /// [`crate::Error::IndexOutOfRange`] if `tree` does not fit `grammar`.
    pub fn new(grammar: &'g Grammar, tree: &TreeItem) -> Result<Self> {
        let mut generator = Self {
            digits: Vec::new(),
            slots: Vec::new(),
            odometer: Vec::new(),
            state: State::Fresh,
        };
        generator.collect_node(grammar, tree)?;
        generator.odometer = vec![0; generator.digits.len()];
        Ok(generator)
    }

    fn collect_node(&mut self, grammar: &'g Grammar, node: &TreeItem) -> Result<()> {
        let replacement = grammar.replacement(node.index, node.transition)?;

        if node.is_leaf() {
            let digit = self.push_digit(&replacement.values);
            self.slots.push(Slot::Literal(digit));
            return Ok(());
        }

        match replacement.function {
            Function::Shadow => {
                let word = self.push_digit(&replacement.values);
                let mut masks = Vec::new();
                let mut rest = Vec::new();
                for child in &node.children {
                    let r = grammar.replacement(child.index, child.transition)?;
                    if r.function == Function::Capitalization && child.is_leaf() {
                        masks.push(self.push_digit(&r.values));
                    } else {
                        rest.push(child);
                    }
                }
                self.slots.push(Slot::Word { word, masks });
                for child in rest {
                    self.collect_node(grammar, child)?;
                }
            }
            Function::Capitalization | Function::Copy | Function::Markov | Function::Transparent => {
                for child in &node.children {
                    self.collect_node(grammar, child)?;
                }
            }
        }
        Ok(())
    }

    fn push_digit(&mut self, values: &'g [String]) -> usize {
        self.digits.push(values);
        self.digits.len() - 1
    }

    /// Number of guesses, computed from the digit sizes without enumerating.
    pub fn guess_count(&self) -> u64 {
        self.digits
            .iter()
            .fold(1_u64, |acc, d| acc.saturating_mul(d.len() as u64))
    }

    /// Restarts the sequence and returns its first guess.
    pub fn first(&mut self) -> Option<String> {
        self.odometer.iter_mut().for_each(|d| *d = 0);
        if self.digits.iter().any(|d| d.is_empty()) {
            self.state = State::Done;
            return None;
        }
        self.state = State::Running;
        Some(self.render())
    }

    /// Advances to the next combination; `false` once the sequence wrapped.
    fn advance(&mut self) -> bool {
        for (i, position) in self.odometer.iter_mut().enumerate().rev() {
            *position += 1;
            if *position < self.digits[i].len() {
                return true;
            }
            *position = 0;
        }
        false
    }

    fn render(&self) -> String {
        let mut guess = String::new();
        for slot in &self.slots {
            match slot {
                Slot::Literal(d) => guess.push_str(&self.digits[*d][self.odometer[*d]]),
                Slot::Word { word, masks } => {
                    let mut value = self.digits[*word][self.odometer[*word]].clone();
                    for m in masks {
                        value = apply_mask(&value, &self.digits[*m][self.odometer[*m]]);
                    }
                    guess.push_str(&value);
                }
            }
        }
        guess
    }

    /// Writes every guess, one per line, and returns how many were written.
    ///
    /// Each line goes out in a single `write_all`, so sinks shared between
    /// threads that lock per write never split a line.
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<u64> {
        let mut written = 0;
        let mut guess = self.first();
        while let Some(mut line) = guess {
            line.push('\n');
            out.write_all(line.as_bytes())?;
            written += 1;
            guess = self.next();
        }
        Ok(written)
    }
}

impl Iterator for GuessGenerator<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.state {
            State::Fresh => self.first(),
            State::Running => {
                if self.advance() {
                    Some(self.render())
                } else {
                    self.state = State::Done;
                    None
                }
            }
            State::Done => None,
        }
    }
}

/// Applies a `U`/`L` capitalisation mask position by position. Characters
/// beyond the mask, and mask characters other than `U`/`L`, leave the word
/// unchanged.
pub fn apply_mask(word: &str, mask: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut mask = mask.chars();
    for c in word.chars() {
        match mask.next() {
            Some('U') => out.extend(c.to_uppercase()),
            Some('L') => out.extend(c.to_lowercase()),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mapping, Replacement, Section};

    /// 0: caps/3, 1: words/3 (shadow), 2: digits/1, 3: START
    fn grammar() -> Grammar {
        let caps = Section::new(
            "CAPITALIZATION",
            "3",
            vec![
                Replacement::terminal(0.8, Function::Capitalization, ["LLL"]),
                Replacement::terminal(0.2, Function::Capitalization, ["ULL", "UUU"]),
            ],
        );
        let words = Section::new(
            "BASE_A",
            "3",
            vec![Replacement::structural(
                1.0,
                Function::Shadow,
                ["cat", "dog"],
                [0],
            )],
        );
        let digits = Section::new(
            "BASE_D",
            "1",
            vec![Replacement::terminal(0.9, Function::Copy, ["1", "2", "3"])],
        );
        let start = Section::new(
            "START",
            "Grammar",
            vec![Replacement::structural(
                1.0,
                Function::Transparent,
                ["A3D1"],
                [1, 2],
            )],
        );
        Grammar::from_parts("g", vec![caps, words, digits, start], Mapping::default()).unwrap()
    }

    fn structure(caps: usize) -> TreeItem {
        TreeItem::new(
            3,
            0,
            vec![
                TreeItem::new(1, 0, vec![TreeItem::new(0, caps, Vec::new())]),
                TreeItem::leaf(2),
            ],
        )
    }

    #[test]
    fn masks_apply_per_position() {
        assert_eq!(apply_mask("password", "ULLLLLLL"), "Password");
        assert_eq!(apply_mask("abc", "UU"), "ABc");
        assert_eq!(apply_mask("ABC", "LxU"), "aBC");
    }

    #[test]
    fn shadow_words_take_their_masks() {
        let grammar = grammar();
        let guesses: Vec<String> = GuessGenerator::new(&grammar, &structure(0))
            .unwrap()
            .collect();
        assert_eq!(guesses, ["cat1", "cat2", "cat3", "dog1", "dog2", "dog3"]);

        let guesses: Vec<String> = GuessGenerator::new(&grammar, &structure(1))
            .unwrap()
            .collect();
        assert_eq!(guesses.len(), 12);
        assert_eq!(guesses[0], "Cat1");
        assert_eq!(guesses[3], "CAT1");
        assert_eq!(guesses[11], "DOG3");
    }

    #[test]
    fn count_matches_full_iteration() {
        let grammar = grammar();
        for caps in 0..2 {
            let generator = GuessGenerator::new(&grammar, &structure(caps)).unwrap();
            let expected = generator.guess_count();
            assert_eq!(generator.count() as u64, expected);
        }
    }

    #[test]
    fn first_restarts_the_sequence() {
        let grammar = grammar();
        let mut generator = GuessGenerator::new(&grammar, &structure(0)).unwrap();
        assert_eq!(generator.next().as_deref(), Some("cat1"));
        assert_eq!(generator.next().as_deref(), Some("cat2"));
        assert_eq!(generator.first().as_deref(), Some("cat1"));
        assert_eq!(generator.by_ref().count(), 5);
        assert_eq!(generator.next(), None);
    }

    #[test]
    fn a_finished_sequence_stays_finished() {
        let grammar = grammar();
        let mut generator = GuessGenerator::new(&grammar, &structure(0)).unwrap();
        let guesses: Vec<String> = generator.by_ref().collect();
        assert_eq!(guesses.len(), 6);
        assert_eq!(generator.next(), None);
        assert_eq!(generator.next(), None);
        assert_eq!(generator.first().as_deref(), Some("cat1"));
    }

    #[test]
    fn write_to_emits_one_line_per_guess() {
        let grammar = grammar();
        let mut out = Vec::new();
        let written = GuessGenerator::new(&grammar, &structure(0))
            .unwrap()
            .write_to(&mut out)
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 6);
    }

    #[test]
    fn rejects_trees_outside_the_grammar() {
        let grammar = grammar();
        assert!(GuessGenerator::new(&grammar, &structure(2)).is_err());
    }
}
