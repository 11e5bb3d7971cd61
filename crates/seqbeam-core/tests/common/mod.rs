#![allow(dead_code)]

use seqbeam_core::{scorer::from_fn, table::TableModel, Distribution, Step, StepScorer, TokenId};

pub const START: TokenId = 0;
pub const END: TokenId = 1;

/// Two-word language: after the start token A is likely, B less so; after either word
/// the end token almost surely follows.
pub const SCENARIO: &str = r#"
    words = ["SOS", "EOS", "A", "B"]
    start = "SOS"
    end = "EOS"

    [[rule]]
    after = "SOS"
    probs = { A = 0.6, B = 0.3, EOS = 0.1 }

    [[rule]]
    probs = { EOS = 0.9, A = 0.05, B = 0.05 }
"#;

pub fn scenario() -> TableModel {
    TableModel::from_toml(SCENARIO).expect("scenario table")
}

/// A model over 7 tokens whose distribution depends on the last token and the step count,
/// with the end token kept unlikely so searches run long.
pub fn noisy_model() -> impl StepScorer<State = u32, Context = ()> + Sync {
    from_fn(|token: TokenId, state: &u32, _: &()| {
        let logits: Vec<f32> = (0..7u32)
            .map(|i| {
                let x = (token * 31 + state * 17 + i * 7) % 11;
                match i {
                    START => -10.0,
                    END => x as f32 * 0.1 - 1.0,
                    _ => x as f32 * 0.3,
                }
            })
            .collect();
        Ok(Step {
            distribution: Distribution::from_logits(&logits),
            state: state + 1,
        })
    })
}
