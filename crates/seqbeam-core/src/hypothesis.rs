use crate::scorer::TokenId;

/// Identity of a hypothesis, assigned in creation order and never reused within a search.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HypothesisId(pub u64);

impl std::fmt::Display for HypothesisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One partial or complete output sequence.
#[derive(Debug, Clone)]
pub struct Hypothesis<S> {
    id: HypothesisId,
    parent: Option<HypothesisId>,
    tokens: Vec<TokenId>,
    score: f32,
    state: S,
}

#[allow(clippy::len_without_is_empty)]
impl<S> Hypothesis<S> {
    /// The hypothesis every search starts from: the start token with a zero score.
    pub fn root(id: HypothesisId, start: TokenId, state: S) -> Self {
        Self {
            id,
            parent: None,
            tokens: vec![start],
            score: 0.0,
            state,
        }
    }

    /// A new hypothesis one token longer than `self`.
    pub fn extend(&self, id: HypothesisId, token: TokenId, log_prob: f32, state: S) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(token);
        Self {
            id,
            parent: Some(self.id),
            tokens,
            score: self.score + log_prob,
            state,
        }
    }

    pub fn id(&self) -> HypothesisId {
        self.id
    }

    pub fn parent(&self) -> Option<HypothesisId> {
        self.parent
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn last_token(&self) -> TokenId {
        // never empty: every hypothesis holds at least the start token
        self.tokens[self.tokens.len() - 1]
    }

    /// Number of tokens, including the start token.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Cumulative log-probability.
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// A hypothesis is complete when it emitted `end` or reached `max_length`.
    pub fn is_complete(&self, end: TokenId, max_length: usize) -> bool {
        self.last_token() == end || self.len() >= max_length
    }
}
