use std::sync::Arc;

use anyhow::Result;
use flume::{Receiver, Sender};

use crate::{
    beam::{Beam, StepReport, Translation},
    error::BeamError,
    option::BeamOption,
    scorer::{StepScorer, TokenId},
};

#[derive(Debug)]
pub enum DecodeEvent {
    /// The request has been picked up.
    Start,
    /// One expansion step finished.
    Step(StepReport),
    /// The search finished with this output.
    Done(Translation),
    /// The search was rejected or the model failed.
    Error(BeamError),
}

pub struct DecodeRequest<S, C: ?Sized> {
    /// Search parameters.
    pub option: BeamOption,
    /// Token every hypothesis starts from.
    pub start: TokenId,
    /// Token that completes a hypothesis.
    pub end: TokenId,
    /// Initial recurrent state of the model.
    pub state: S,
    /// Source context shared read-only by every hypothesis.
    pub context: Arc<C>,
}

pub enum ThreadRequest<M: StepScorer> {
    /// Decode one input.
    Decode {
        request: Box<DecodeRequest<M::State, M::Context>>,
        sender: Sender<DecodeEvent>,
    },
    /// Replace the model used by requests received afterwards.
    Reload(Arc<M>),
}

/// Serve decode requests until every sender is dropped. Each search runs on its own
/// blocking task, so a slow model call never stalls the request loop.
pub async fn decode_route<M>(model: Arc<M>, receiver: Receiver<ThreadRequest<M>>) -> Result<()>
where
    M: StepScorer + Send + Sync + 'static,
    M::State: Clone + Send + Sync + 'static,
    M::Context: Send + Sync + 'static,
{
    let mut model = model;
    loop {
        let Ok(request) = receiver.recv_async().await else {
            log::info!("decode route exit");
            break Ok(());
        };

        match request {
            ThreadRequest::Reload(next) => {
                model = next;
                log::info!("model reloaded");
            }
            ThreadRequest::Decode { request, sender } => {
                let model = model.clone();
                tokio::task::spawn_blocking(move || decode(&*model, *request, sender));
            }
        }
    }
}

fn decode<M>(
    model: &M,
    request: DecodeRequest<M::State, M::Context>,
    sender: Sender<DecodeEvent>,
) where
    M: StepScorer + Sync,
    M::State: Clone + Send + Sync,
    M::Context: Sync,
{
    let _ = sender.send(DecodeEvent::Start);
    let _ = match run(model, request, &sender) {
        Ok(Some(translation)) => sender.send(DecodeEvent::Done(translation)),
        Ok(None) => Ok(()),
        Err(err) => {
            log::error!("decode failed: {err}");
            sender.send(DecodeEvent::Error(err))
        }
    };
}

/// Expand step by step, streaming reports. Returns `None` once the caller stops listening.
fn run<M>(
    model: &M,
    request: DecodeRequest<M::State, M::Context>,
    sender: &Sender<DecodeEvent>,
) -> crate::Result<Option<Translation>>
where
    M: StepScorer + Sync,
    M::State: Clone + Send + Sync,
    M::Context: Sync,
{
    let DecodeRequest {
        option,
        start,
        end,
        state,
        context,
    } = request;

    let mut beam = Beam::new(option, start, end, state)?;
    while !beam.is_done() {
        if sender.is_disconnected() {
            log::debug!("decode receiver dropped at step {}", beam.step());
            return Ok(None);
        }
        let report = crate::advance(&mut beam, model, &*context)?;
        let _ = sender.send(DecodeEvent::Step(report));
    }
    beam.finalize().map(Some)
}
