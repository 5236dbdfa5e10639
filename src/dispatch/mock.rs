use async_trait::async_trait;
use std::sync::Mutex;

use crate::dispatch::{DispatchTargets, Dispatcher, OutboundEvent};
use crate::error::DispatchError;

#[derive(Debug, Default)]
struct State {
    delivered: Vec<(OutboundEventRecord, DispatchTargets)>,
    fail_next: Option<DispatchError>,
}

#[derive(Debug, Clone)]
pub struct OutboundEventRecord {
    pub payload: Vec<u8>,
}

/// Test double recording every dispatch attempt, with the ability to queue a
/// one-shot failure for testing the no-ack-on-failure invariant.
#[derive(Debug, Default)]
pub struct MockDispatcher {
    state: Mutex<State>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, err: DispatchError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    pub fn delivered_count(&self) -> usize {
        self.state.lock().unwrap().delivered.len()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, event: OutboundEvent, targets: DispatchTargets) -> Result<(), DispatchError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.delivered.push((OutboundEventRecord { payload: event.payload }, targets));
        Ok(())
    }
}
