use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use approx::assert_relative_eq;
use itertools::Itertools;
use seqbeam_core::{
    scorer::from_fn, search, vocab::EOS_MARKER, Beam, BeamError, BeamOption, Distribution, Step,
    StepScorer, TokenId,
};

mod common;

use common::{noisy_model, scenario, END, START};

fn option(width: usize, max_length: usize) -> BeamOption {
    BeamOption {
        width,
        max_length,
        ..Default::default()
    }
}

#[test]
fn two_word_scenario() {
    let model = scenario();
    let mut beam = Beam::new(option(2, 3), model.start(), model.end(), 1).unwrap();

    let report = beam.expand(&model, &()).unwrap();
    assert_eq!(report.active, 2);
    assert!(report.completed.is_empty());
    let words = beam
        .active()
        .iter()
        .map(|h| model.vocab().word(h.last_token()).unwrap())
        .collect_vec();
    assert_eq!(words, vec!["A", "B"]);

    let report = beam.expand(&model, &()).unwrap();
    assert_eq!(report.active, 0);
    assert_eq!(report.completed.len(), 2);
    assert!(beam.is_done());

    let normalized = beam.completed().iter().map(|x| x.normalized()).collect_vec();
    assert_relative_eq!(normalized[0], (0.6f32.ln() + 0.9f32.ln()) / 3.0, epsilon = 1e-6);
    assert_relative_eq!(normalized[1], (0.3f32.ln() + 0.9f32.ln()) / 3.0, epsilon = 1e-6);

    let translation = beam.finalize().unwrap();
    assert!(translation.complete);
    let words = model.vocab().decode(&translation.tokens, model.end());
    assert_eq!(words, vec!["SOS", "A", EOS_MARKER]);
    assert_eq!(
        model.vocab().decode(translation.generated(), model.end()),
        vec!["A", EOS_MARKER]
    );
}

#[test]
fn small_completion_cap_is_rejected_before_scoring() {
    let calls = AtomicUsize::new(0);
    let model = from_fn(|_: TokenId, _: &(), _: &()| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Step {
            distribution: Distribution::from_probs(&[0.5, 0.5]),
            state: (),
        })
    });
    let option = BeamOption {
        width: 3,
        max_completed: Some(2),
        ..Default::default()
    };
    let err = search(&model, &option, START, END, (), &(), |_| {}).unwrap_err();
    assert!(err.is_config());
    assert!(matches!(err, BeamError::MaxCompletedBelowWidth { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn beam_size_invariant() {
    let model = noisy_model();
    for width in 1..=5 {
        let mut steps = 0;
        search(&model, &option(width, 12), START, END, 0, &(), |report| {
            steps += 1;
            assert!(report.active + report.completed.len() <= width);
            assert!(report.expanded <= width);
        })
        .unwrap();
        assert!(steps <= 11);
    }
}

#[test]
fn length_grows_by_one_per_step() {
    let model = noisy_model();
    let mut beam = Beam::new(option(4, 10), START, END, 0).unwrap();
    while !beam.is_done() {
        let before = beam.step();
        beam.expand(&model, &()).unwrap();
        assert_eq!(beam.step(), before + 1);
        for hypothesis in beam.active() {
            assert_eq!(hypothesis.len(), beam.step() + 1);
            assert!(hypothesis.len() < 10);
        }
    }
    for completed in beam.completed() {
        let hypothesis = completed.hypothesis();
        assert!(hypothesis.last_token() == END || hypothesis.len() == 10);
        assert!(hypothesis.tokens()[..hypothesis.len() - 1]
            .iter()
            .all(|&token| token != END));
    }
}

#[test]
fn searches_are_deterministic() {
    let model = noisy_model();
    let run = || {
        let mut beam = Beam::new(option(3, 9), START, END, 0).unwrap();
        let best = beam.run(&model, &(), |_| {}).unwrap();
        (best, beam.n_best(usize::MAX))
    };
    assert_eq!(run(), run());
}

#[test]
fn width_one_is_greedy() {
    let model = noisy_model();
    let max_length = 12;

    let mut tokens = vec![START];
    let mut state = 0;
    while tokens.len() < max_length {
        let step = model.step(*tokens.last().unwrap(), &state, &()).unwrap();
        let (token, _) = step.distribution.top_k(1)[0];
        tokens.push(token);
        state = step.state;
        if token == END {
            break;
        }
    }

    let translation = search(&model, &option(1, max_length), START, END, 0, &(), |_| {}).unwrap();
    assert_eq!(translation.tokens, tokens);
}

#[test]
fn completion_cap_stops_early() {
    let model = from_fn(|_: TokenId, _: &(), _: &()| {
        Ok(Step {
            distribution: Distribution::from_probs(&[0.05, 0.5, 0.25, 0.2]),
            state: (),
        })
    });
    let option = BeamOption {
        width: 2,
        max_length: 20,
        max_completed: Some(2),
        ..Default::default()
    };
    let mut beam = Beam::new(option, START, END, ()).unwrap();
    beam.run(&model, &(), |_| {}).unwrap();
    assert!(beam.completed().len() >= 2);
    assert!(!beam.active().is_empty());
    assert!(beam.step() < 19);
}

#[test]
fn max_length_forces_completion() {
    // the end token is never proposed
    let model = from_fn(|_: TokenId, _: &(), _: &()| {
        Ok(Step {
            distribution: Distribution::from_probs(&[0.0, 0.0, 0.7, 0.3]),
            state: (),
        })
    });
    let mut beam = Beam::new(option(2, 5), START, END, ()).unwrap();
    let translation = beam.run(&model, &(), |_| {}).unwrap();
    assert!(translation.complete);
    assert_eq!(translation.tokens.len(), 5);
    assert_eq!(translation.tokens, vec![START, 2, 2, 2, 2]);
    assert!(beam.completed().iter().all(|x| x.hypothesis().len() == 5));
}

#[test]
fn scorer_failure_is_propagated() {
    let model = from_fn(|token: TokenId, _: &(), _: &()| {
        if token != START {
            bail!("model exploded");
        }
        Ok(Step {
            distribution: Distribution::from_probs(&[0.0, 0.2, 0.8]),
            state: (),
        })
    });
    let err = search(&model, &option(2, 6), START, END, (), &(), |_| {}).unwrap_err();
    assert!(matches!(err, BeamError::Scorer(_)));
    assert_eq!(err.to_string(), "model exploded");
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_matches_sequential() {
    let model = noisy_model();
    for width in [1, 2, 4, 7] {
        let mut sequential = Beam::new(option(width, 11), START, END, 0).unwrap();
        let mut parallel = sequential.clone();

        let mut reports = vec![];
        let x = sequential.run(&model, &(), |r| reports.push(r.clone())).unwrap();
        let mut parallel_reports = vec![];
        let y = parallel
            .run_parallel(&model, &(), |r| parallel_reports.push(r.clone()))
            .unwrap();

        assert_eq!(x, y);
        assert_eq!(reports, parallel_reports);
        assert_eq!(sequential.n_best(usize::MAX), parallel.n_best(usize::MAX));
    }
}

#[test]
fn beam_recovers_from_greedy_choice() {
    let model =
        seqbeam_core::table::TableModel::from_toml(include_str!("../../../assets/models/toy.toml"))
            .unwrap();
    let decode = |width| {
        let translation = search(
            &model,
            &option(width, 16),
            model.start(),
            model.end(),
            1,
            &(),
            |_| {},
        )
        .unwrap();
        model
            .vocab()
            .decode(translation.generated(), model.end())
            .join(" ")
    };
    assert_eq!(decode(1), "the student <EOS>");
    assert_eq!(decode(3), "i am a student <EOS>");
}
