//! Beam-search decoding for autoregressive sequence generators.
//!
//! A [`Beam`] keeps up to `width` live hypotheses. Each step scores every live hypothesis
//! with a [`StepScorer`], keeps the `width` best extensions across all of them, and moves
//! the ones that emitted the end token or reached the length bound into the completed
//! set. [`Beam::finalize`] then picks the completed hypothesis with the best
//! length-normalized score.

pub mod beam;
pub mod error;
pub mod hypothesis;
pub mod option;
pub mod scorer;
pub mod serve;
pub mod table;
pub mod topk;
pub mod vocab;

pub use beam::{Beam, Completed, StepReport, Translation};
pub use error::{BeamError, Result};
pub use hypothesis::{Hypothesis, HypothesisId};
pub use option::{BeamOption, LengthPenalty};
pub use scorer::{Distribution, Step, StepScorer, TokenId};
pub use serve::{decode_route, DecodeEvent, DecodeRequest, ThreadRequest};
pub use vocab::Vocabulary;

/// Run a complete search from `start` and return the best output.
///
/// `observer` sees the report of every step. When `option.parallel` is set and the
/// `parallel` feature is enabled, the model calls of each step run on the rayon pool.
pub fn search<M>(
    model: &M,
    option: &BeamOption,
    start: TokenId,
    end: TokenId,
    state: M::State,
    context: &M::Context,
    mut observer: impl FnMut(&StepReport),
) -> Result<Translation>
where
    M: StepScorer + Sync + ?Sized,
    M::State: Clone + Send + Sync,
    M::Context: Sync,
{
    let mut beam = Beam::new(option.clone(), start, end, state)?;
    while !beam.is_done() {
        let report = advance(&mut beam, model, context)?;
        observer(&report);
    }
    beam.finalize()
}

/// One expansion step, on the rayon pool if the option asks for it.
pub(crate) fn advance<M>(
    beam: &mut Beam<M::State>,
    model: &M,
    context: &M::Context,
) -> Result<StepReport>
where
    M: StepScorer + Sync + ?Sized,
    M::State: Clone + Send + Sync,
    M::Context: Sync,
{
    match beam.option().parallel {
        #[cfg(feature = "parallel")]
        true => beam.expand_parallel(model, context),
        #[cfg(not(feature = "parallel"))]
        true => {
            if beam.step() == 0 {
                log::warn!("built without the `parallel` feature, scoring sequentially");
            }
            beam.expand(model, context)
        }
        false => beam.expand(model, context),
    }
}
