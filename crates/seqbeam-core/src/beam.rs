//! The search frontier: live hypotheses, completed hypotheses and the per-step expansion.

use itertools::Itertools;

use crate::{
    error::{BeamError, Result},
    hypothesis::{Hypothesis, HypothesisId},
    option::BeamOption,
    scorer::{Step, StepScorer, TokenId},
    topk::{Offer, TopK},
};

/// A hypothesis that will not be expanded again, with its normalized score.
#[derive(Debug, Clone)]
pub struct Completed<S> {
    hypothesis: Hypothesis<S>,
    normalized: f32,
}

impl<S> Completed<S> {
    pub fn hypothesis(&self) -> &Hypothesis<S> {
        &self.hypothesis
    }

    /// Score after the length penalty, computed once on completion.
    pub fn normalized(&self) -> f32 {
        self.normalized
    }
}

/// The selected output of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub id: HypothesisId,
    /// Tokens including the start token, and the end token if it was emitted.
    pub tokens: Vec<TokenId>,
    /// Cumulative log-probability.
    pub score: f32,
    /// Score after the length penalty.
    pub normalized: f32,
    /// Whether the hypothesis had been completed when it was selected.
    pub complete: bool,
}

impl Translation {
    fn new<S>(hypothesis: &Hypothesis<S>, normalized: f32, complete: bool) -> Self {
        Self {
            id: hypothesis.id(),
            tokens: hypothesis.tokens().to_vec(),
            score: hypothesis.score(),
            normalized,
            complete,
        }
    }

    /// Tokens after the start token.
    pub fn generated(&self) -> &[TokenId] {
        &self.tokens[1.min(self.tokens.len())..]
    }
}

/// What happened during one call to [`Beam::expand`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// One-based index of the step.
    pub step: usize,
    /// Number of hypotheses that were scored.
    pub expanded: usize,
    /// Number of candidates proposed across all of them.
    pub candidates: usize,
    /// Number of admitted candidates that were displaced later in the step.
    pub evicted: usize,
    /// Hypotheses left active after the step.
    pub active: usize,
    /// Hypotheses completed by this step.
    pub completed: Vec<HypothesisId>,
}

/// A proposed extension, materialized into a [`Hypothesis`] only if it survives the step.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    parent: usize,
    token: TokenId,
    log_prob: f32,
}

#[derive(Debug, Clone)]
pub struct Beam<S> {
    option: BeamOption,
    end: TokenId,
    active: Vec<Hypothesis<S>>,
    completed: Vec<Completed<S>>,
    next_id: u64,
    step: usize,
}

impl<S: Clone> Beam<S> {
    /// Start a search from `start`. The option is validated here, before any model call.
    pub fn new(option: BeamOption, start: TokenId, end: TokenId, state: S) -> Result<Self> {
        option.validate()?;

        let mut beam = Self {
            option,
            end,
            active: Vec::new(),
            completed: Vec::new(),
            next_id: 0,
            step: 0,
        };
        let root = Hypothesis::root(beam.allocate_id(), start, state);
        beam.admit(root);
        Ok(beam)
    }

    pub fn option(&self) -> &BeamOption {
        &self.option
    }

    /// Number of expansion steps run so far.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn active(&self) -> &[Hypothesis<S>] {
        &self.active
    }

    pub fn completed(&self) -> &[Completed<S>] {
        &self.completed
    }

    /// No active hypothesis is left, or the completion cap has been reached.
    pub fn is_done(&self) -> bool {
        let capped = self
            .option
            .max_completed
            .is_some_and(|cap| self.completed.len() >= cap);
        self.active.is_empty() || capped
    }

    fn allocate_id(&mut self) -> HypothesisId {
        let id = HypothesisId(self.next_id);
        self.next_id += 1;
        id
    }

    fn admit(&mut self, hypothesis: Hypothesis<S>) -> Option<HypothesisId> {
        match hypothesis.is_complete(self.end, self.option.max_length) {
            true => {
                let id = hypothesis.id();
                let normalized = self
                    .option
                    .length_penalty
                    .apply(hypothesis.score(), hypothesis.len());
                self.completed.push(Completed {
                    hypothesis,
                    normalized,
                });
                Some(id)
            }
            false => {
                self.active.push(hypothesis);
                None
            }
        }
    }

    /// Score every active hypothesis and keep the `width` best extensions across all of them.
    pub fn expand<M>(&mut self, model: &M, context: &M::Context) -> Result<StepReport>
    where
        M: StepScorer<State = S> + ?Sized,
    {
        let steps: Vec<_> = self
            .active
            .iter()
            .map(|hypothesis| score(model, hypothesis, context))
            .try_collect()
            .map_err(BeamError::Scorer)?;
        Ok(self.reduce(steps))
    }

    /// Same as [`Beam::expand`], but the model calls of a step run on the rayon pool.
    /// Candidates are still reduced in parent order, so the outcome is identical.
    #[cfg(feature = "parallel")]
    pub fn expand_parallel<M>(&mut self, model: &M, context: &M::Context) -> Result<StepReport>
    where
        M: StepScorer<State = S> + Sync + ?Sized,
        M::Context: Sync,
        S: Send + Sync,
    {
        use rayon::prelude::*;

        let steps: Vec<_> = self
            .active
            .par_iter()
            .map(|hypothesis| score(model, hypothesis, context))
            .collect::<anyhow::Result<_>>()
            .map_err(BeamError::Scorer)?;
        Ok(self.reduce(steps))
    }

    fn reduce(&mut self, steps: Vec<Step<S>>) -> StepReport {
        let parents = std::mem::take(&mut self.active);
        let width = self.option.width;
        self.step += 1;

        let mut pool = TopK::new(width);
        let mut candidates = 0;
        let mut evicted = 0;
        for (index, (parent, step)) in parents.iter().zip(steps.iter()).enumerate() {
            for (token, log_prob) in step.distribution.top_k(width) {
                candidates += 1;
                let candidate = Candidate {
                    parent: index,
                    token,
                    log_prob,
                };
                match pool.offer(parent.score() + log_prob, candidate) {
                    Offer::Inserted => {}
                    Offer::Replaced(loser) => {
                        evicted += 1;
                        log::trace!(
                            "step {}: {} + {} displaced {} + {}",
                            self.step,
                            parent.id(),
                            token,
                            parents[loser.parent].id(),
                            loser.token
                        );
                    }
                    Offer::Rejected(_) => {}
                }
            }
        }

        let survivors = pool.into_sorted_vec();

        // the last survivor of each parent takes the new state, the others clone it
        let mut uses = vec![0usize; parents.len()];
        for (_, candidate) in &survivors {
            uses[candidate.parent] += 1;
        }
        let mut states = steps.into_iter().map(|step| Some(step.state)).collect_vec();

        let mut completed = Vec::new();
        for (_, Candidate { parent, token, log_prob }) in survivors {
            uses[parent] -= 1;
            let state = match uses[parent] {
                0 => states[parent].take(),
                _ => states[parent].clone(),
            };
            let Some(state) = state else {
                continue;
            };
            let id = self.allocate_id();
            let hypothesis = parents[parent].extend(id, token, log_prob, state);
            if let Some(id) = self.admit(hypothesis) {
                completed.push(id);
            }
        }

        let report = StepReport {
            step: self.step,
            expanded: parents.len(),
            candidates,
            evicted,
            active: self.active.len(),
            completed,
        };
        log::debug!(
            "step {}: expanded {}, proposed {}, evicted {}, active {}, completed {} (total {})",
            report.step,
            report.expanded,
            report.candidates,
            report.evicted,
            report.active,
            report.completed.len(),
            self.completed.len(),
        );
        report
    }

    /// Pick the hypothesis with the highest normalized score. Completed hypotheses are
    /// preferred; active ones are only considered if nothing has been completed.
    pub fn finalize(&self) -> Result<Translation> {
        let best = self.completed.iter().reduce(|best, other| {
            match other.normalized > best.normalized {
                true => other,
                false => best,
            }
        });
        if let Some(best) = best {
            return Ok(Translation::new(&best.hypothesis, best.normalized, true));
        }

        let penalty = self.option.length_penalty;
        let best = self
            .active
            .iter()
            .map(|hypothesis| (hypothesis, penalty.apply(hypothesis.score(), hypothesis.len())))
            .reduce(|best, other| match other.1 > best.1 {
                true => other,
                false => best,
            });
        match best {
            Some((hypothesis, normalized)) => {
                log::warn!(
                    "no completed hypothesis after {} steps, falling back to active {}",
                    self.step,
                    hypothesis.id()
                );
                Ok(Translation::new(hypothesis, normalized, false))
            }
            None => Err(BeamError::EmptyBeam),
        }
    }

    /// Up to `n` completed hypotheses, best first; ties keep completion order.
    pub fn n_best(&self, n: usize) -> Vec<Translation> {
        self.completed
            .iter()
            .sorted_by(|x, y| y.normalized.total_cmp(&x.normalized))
            .take(n)
            .map(|completed| Translation::new(&completed.hypothesis, completed.normalized, true))
            .collect()
    }

    /// Expand until done, reporting every step to `observer`, then finalize.
    pub fn run<M>(
        &mut self,
        model: &M,
        context: &M::Context,
        mut observer: impl FnMut(&StepReport),
    ) -> Result<Translation>
    where
        M: StepScorer<State = S> + ?Sized,
    {
        while !self.is_done() {
            let report = self.expand(model, context)?;
            observer(&report);
        }
        self.finalize()
    }

    #[cfg(feature = "parallel")]
    pub fn run_parallel<M>(
        &mut self,
        model: &M,
        context: &M::Context,
        mut observer: impl FnMut(&StepReport),
    ) -> Result<Translation>
    where
        M: StepScorer<State = S> + Sync + ?Sized,
        M::Context: Sync,
        S: Send + Sync,
    {
        while !self.is_done() {
            let report = self.expand_parallel(model, context)?;
            observer(&report);
        }
        self.finalize()
    }
}

fn score<M>(
    model: &M,
    hypothesis: &Hypothesis<M::State>,
    context: &M::Context,
) -> anyhow::Result<Step<M::State>>
where
    M: StepScorer + ?Sized,
{
    model.step(hypothesis.last_token(), hypothesis.state(), context)
}
