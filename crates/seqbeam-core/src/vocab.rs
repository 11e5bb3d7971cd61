use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{BeamError, Result},
    scorer::TokenId,
};

/// Printed in place of the end token when decoding.
pub const EOS_MARKER: &str = "<EOS>";
/// Printed for ids outside the vocabulary.
pub const UNK_MARKER: &str = "<UNK>";

/// Two-way lookup between token ids and words.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    index2word: Vec<String>,
    word2index: HashMap<String, TokenId>,
}

impl From<Vec<String>> for Vocabulary {
    fn from(index2word: Vec<String>) -> Self {
        let word2index = index2word
            .iter()
            .enumerate()
            .map(|(index, word)| (word.clone(), index as TokenId))
            .collect();
        Self {
            index2word,
            word2index,
        }
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(value: Vocabulary) -> Self {
        value.index2word
    }
}

impl Vocabulary {
    pub fn new<I, T>(words: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        words.into_iter().map(Into::into).collect::<Vec<_>>().into()
    }

    pub fn len(&self) -> usize {
        self.index2word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index2word.is_empty()
    }

    pub fn word(&self, token: TokenId) -> Option<&str> {
        self.index2word.get(token as usize).map(String::as_str)
    }

    pub fn index(&self, word: &str) -> Option<TokenId> {
        self.word2index.get(word).copied()
    }

    pub fn encode<'a>(&self, words: impl IntoIterator<Item = &'a str>) -> Result<Vec<TokenId>> {
        words
            .into_iter()
            .map(|word| {
                self.index(word)
                    .ok_or_else(|| BeamError::UnknownWord(word.into()))
            })
            .collect()
    }

    /// Map tokens to words, stopping after `end`, which is rendered as [`EOS_MARKER`].
    pub fn decode(&self, tokens: &[TokenId], end: TokenId) -> Vec<String> {
        let mut words = Vec::with_capacity(tokens.len());
        for &token in tokens {
            if token == end {
                words.push(EOS_MARKER.to_string());
                break;
            }
            words.push(self.word(token).unwrap_or(UNK_MARKER).to_string());
        }
        words
    }
}
