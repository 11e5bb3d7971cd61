//! A deterministic model backed by a transition table, for demos and tests.
//!
//! The table is written in TOML:
//!
//! ```toml
//! words = ["SOS", "EOS", "A", "B"]
//! start = "SOS"
//! end = "EOS"
//!
//! [[rule]]
//! after = "SOS"
//! probs = { A = 0.6, B = 0.3, EOS = 0.1 }
//!
//! [[rule]]
//! at = 3
//! probs = { EOS = 1.0 }
//! ```
//!
//! Each step picks the first rule whose `after` matches the last token and whose `at`
//! matches the number of tokens emitted so far; either key may be omitted. Words left
//! out of `probs` get probability zero. Without a matching rule, the `fallback`
//! distribution is used, which defaults to emitting the end token.

use std::{collections::BTreeMap, path::Path};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, BufReader},
};

use crate::{
    scorer::{Distribution, Step, StepScorer, TokenId},
    vocab::Vocabulary,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// Previous word this rule applies to.
    pub after: Option<String>,
    /// Number of emitted tokens (start token included) this rule applies at.
    pub at: Option<usize>,
    /// Probability of each next word.
    pub probs: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub words: Vec<String>,
    pub start: String,
    pub end: String,
    #[serde(default, rename = "rule")]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub fallback: Option<BTreeMap<String, f32>>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    after: Option<TokenId>,
    at: Option<usize>,
    distribution: Distribution,
}

#[derive(Debug, Clone)]
pub struct TableModel {
    vocab: Vocabulary,
    start: TokenId,
    end: TokenId,
    rules: Vec<CompiledRule>,
    fallback: Distribution,
}

impl TryFrom<Table> for TableModel {
    type Error = anyhow::Error;

    fn try_from(value: Table) -> Result<Self, Self::Error> {
        let Table {
            words,
            start,
            end,
            rules,
            fallback,
        } = value;

        let vocab = Vocabulary::new(words);
        if vocab.is_empty() {
            bail!("table has no words");
        }
        let lookup = |word: &str| {
            vocab
                .index(word)
                .ok_or_else(|| anyhow!("word {word:?} is not in the table"))
        };
        let start = lookup(start.as_str())?;
        let end = lookup(end.as_str())?;

        let compile = |probs: &BTreeMap<String, f32>| -> Result<Distribution> {
            let mut dense = vec![0.0; vocab.len()];
            for (word, &prob) in probs {
                if !(0.0..=1.0).contains(&prob) {
                    bail!("probability of {word:?} out of range: {prob}");
                }
                dense[lookup(word.as_str())? as usize] = prob;
            }
            Ok(Distribution::from_probs(&dense))
        };

        let rules = rules
            .iter()
            .map(|rule| -> Result<_> {
                Ok(CompiledRule {
                    after: rule.after.as_deref().map(lookup).transpose()?,
                    at: rule.at,
                    distribution: compile(&rule.probs)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let fallback = match fallback {
            Some(probs) => compile(&probs)?,
            None => {
                let mut dense = vec![0.0; vocab.len()];
                dense[end as usize] = 1.0;
                Distribution::from_probs(&dense)
            }
        };

        Ok(Self {
            vocab,
            start,
            end,
            rules,
            fallback,
        })
    }
}

impl TableModel {
    pub fn from_toml(contents: &str) -> Result<Self> {
        let table: Table = toml::from_str(contents)?;
        table.try_into()
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut contents = String::new();
        reader.read_to_string(&mut contents).await?;
        Self::from_toml(&contents)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn start(&self) -> TokenId {
        self.start
    }

    pub fn end(&self) -> TokenId {
        self.end
    }
}

impl StepScorer for TableModel {
    /// Number of tokens emitted so far, start token included.
    type State = usize;
    type Context = ();

    fn step(&self, token: TokenId, state: &usize, _context: &()) -> Result<Step<usize>> {
        let position = *state;
        let distribution = self
            .rules
            .iter()
            .find(|rule| {
                rule.after.map_or(true, |after| after == token)
                    && rule.at.map_or(true, |at| at == position)
            })
            .map_or(&self.fallback, |rule| &rule.distribution)
            .clone();
        Ok(Step {
            distribution,
            state: position + 1,
        })
    }
}
