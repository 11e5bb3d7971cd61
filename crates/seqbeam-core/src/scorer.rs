use std::marker::PhantomData;

use anyhow::Result;
use itertools::Itertools;

pub type TokenId = u32;

/// Log-probabilities over the vocabulary, indexed by token id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution(Vec<f32>);

impl Distribution {
    pub fn from_log_probs(log_probs: Vec<f32>) -> Self {
        Self(log_probs)
    }

    pub fn from_probs(probs: &[f32]) -> Self {
        Self(probs.iter().map(|x| x.ln()).collect())
    }

    /// Log-softmax over raw model output.
    pub fn from_logits(logits: &[f32]) -> Self {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return Self(vec![f32::NEG_INFINITY; logits.len()]);
        }
        let sum: f32 = logits.iter().map(|x| (x - max).exp()).sum();
        let norm = max + sum.ln();
        Self(logits.iter().map(|x| x - norm).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn log_prob(&self, token: TokenId) -> Option<f32> {
        self.0.get(token as usize).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// The `k` most likely tokens, best first; ties go to the lower token id.
    /// NaN entries are never selected.
    pub fn top_k(&self, k: usize) -> Vec<(TokenId, f32)> {
        if k == 0 {
            return Vec::new();
        }

        let compare =
            |(i, x): &(usize, f32), (j, y): &(usize, f32)| y.total_cmp(x).then(i.cmp(j));
        let mut candidates = self
            .0
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, x)| !x.is_nan())
            .collect_vec();
        if k < candidates.len() {
            candidates.select_nth_unstable_by(k, compare);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(compare);
        candidates
            .into_iter()
            .map(|(id, x)| (id as TokenId, x))
            .collect()
    }
}

/// Output of a single model step.
#[derive(Debug, Clone)]
pub struct Step<S> {
    pub distribution: Distribution,
    pub state: S,
}

/// The model consumed by the search: maps the last emitted token, the recurrent state
/// and the shared source context to a next-token distribution and a new state.
///
/// Implementations must be deterministic for a fixed model and must not mutate the context.
pub trait StepScorer {
    type State;
    type Context: ?Sized;

    fn step(
        &self,
        token: TokenId,
        state: &Self::State,
        context: &Self::Context,
    ) -> Result<Step<Self::State>>;
}

impl<M: StepScorer + ?Sized> StepScorer for &M {
    type State = M::State;
    type Context = M::Context;

    fn step(
        &self,
        token: TokenId,
        state: &Self::State,
        context: &Self::Context,
    ) -> Result<Step<Self::State>> {
        (**self).step(token, state, context)
    }
}

/// Adapts a closure into a [`StepScorer`].
pub struct FnScorer<F, S, C: ?Sized> {
    f: F,
    phantom: PhantomData<fn(&S, &C) -> S>,
}

pub fn from_fn<F, S, C>(f: F) -> FnScorer<F, S, C>
where
    F: Fn(TokenId, &S, &C) -> Result<Step<S>>,
    C: ?Sized,
{
    FnScorer {
        f,
        phantom: PhantomData,
    }
}

impl<F, S, C> StepScorer for FnScorer<F, S, C>
where
    F: Fn(TokenId, &S, &C) -> Result<Step<S>>,
    C: ?Sized,
{
    type State = S;
    type Context = C;

    fn step(&self, token: TokenId, state: &S, context: &C) -> Result<Step<S>> {
        (self.f)(token, state, context)
    }
}
