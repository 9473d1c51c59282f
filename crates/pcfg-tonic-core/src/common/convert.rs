//! Conversions between engine types and their wire messages.
//!
//! Engine to wire is infallible. Wire to engine re-validates everything:
//! indices must fit `usize`, function tags must be known, and the grammar is
//! rebuilt through [`pcfg::Grammar::from_parts`] so a worker never runs on a
//! grammar the engine would have rejected.

use crate::{Error, Result, proto};
use pcfg::{Function, Grammar, Mapping, Replacement, Section, TreeItem};
use std::collections::BTreeMap;

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(format!("{what} {value} does not fit usize")))
}

impl From<Function> for proto::Function {
    fn from(f: Function) -> Self {
        match f {
            Function::Capitalization => Self::Capitalization,
            Function::Copy => Self::Copy,
            Function::Shadow => Self::Shadow,
            Function::Markov => Self::Markov,
            Function::Transparent => Self::Transparent,
        }
    }
}

impl TryFrom<proto::Function> for Function {
    type Error = Error;

    fn try_from(f: proto::Function) -> Result<Self> {
        match f {
            proto::Function::Capitalization => Ok(Self::Capitalization),
            proto::Function::Copy => Ok(Self::Copy),
            proto::Function::Shadow => Ok(Self::Shadow),
            proto::Function::Markov => Ok(Self::Markov),
            proto::Function::Transparent => Ok(Self::Transparent),
            proto::Function::Unspecified => Err(Error::invalid("replacement function unspecified")),
        }
    }
}

impl From<&Replacement> for proto::Replacement {
    fn from(r: &Replacement) -> Self {
        Self {
            probability: r.probability,
            is_terminal: r.is_terminal,
            values: r.values.clone(),
            function: proto::Function::from(r.function).into(),
            pos: r.pos.iter().map(|&p| p as u64).collect(),
        }
    }
}

impl TryFrom<proto::Replacement> for Replacement {
    type Error = Error;

    fn try_from(r: proto::Replacement) -> Result<Self> {
        let function = proto::Function::try_from(r.function)
            .map_err(|_| Error::invalid(format!("unknown replacement function {}", r.function)))?;
        Ok(Self {
            probability: r.probability,
            is_terminal: r.is_terminal,
            function: function.try_into()?,
            values: r.values,
            pos: r
                .pos
                .into_iter()
                .map(|p| to_usize(p, "section index"))
                .collect::<Result<_>>()?,
        })
    }
}

impl From<&Section> for proto::Section {
    fn from(s: &Section) -> Self {
        Self {
            kind: s.kind.clone(),
            name: s.name.clone(),
            replacements: s.replacements.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<proto::Section> for Section {
    type Error = Error;

    fn try_from(s: proto::Section) -> Result<Self> {
        let replacements = s
            .replacements
            .into_iter()
            .map(Replacement::try_from)
            .collect::<Result<_>>()?;
        Ok(Section::new(s.kind, s.name, replacements))
    }
}

impl From<&Grammar> for proto::Grammar {
    fn from(g: &Grammar) -> Self {
        Self {
            rule_name: g.rule_name().to_string(),
            sections: g.sections().iter().map(Into::into).collect(),
            mapping: g
                .mapping()
                .iter()
                .map(|(id, names)| {
                    let value = names.iter().map(|(n, &i)| (n.clone(), i as u64)).collect();
                    (id.to_string(), proto::IndexMap { value })
                })
                .collect(),
        }
    }
}

impl TryFrom<proto::Grammar> for Grammar {
    type Error = Error;

    fn try_from(g: proto::Grammar) -> Result<Self> {
        let sections = g
            .sections
            .into_iter()
            .map(Section::try_from)
            .collect::<Result<Vec<_>>>()?;
        let mapping = g
            .mapping
            .into_iter()
            .map(|(id, names)| {
                let names = names
                    .value
                    .into_iter()
                    .map(|(n, i)| Ok((n, to_usize(i, "section index")?)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok((id, names))
            })
            .collect::<Result<Mapping>>()?;
        Ok(Grammar::from_parts(g.rule_name, sections, mapping)?)
    }
}

impl From<&TreeItem> for proto::TreeItem {
    fn from(t: &TreeItem) -> Self {
        Self {
            index: t.index as u64,
            transition: t.transition as u64,
            children: t.children.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<proto::TreeItem> for TreeItem {
    type Error = Error;

    fn try_from(t: proto::TreeItem) -> Result<Self> {
        let children = t
            .children
            .into_iter()
            .map(TreeItem::try_from)
            .collect::<Result<_>>()?;
        Ok(TreeItem::new(
            to_usize(t.index, "section index")?,
            to_usize(t.transition, "transition")?,
            children,
        ))
    }
}
