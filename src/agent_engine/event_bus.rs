use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::SendError;
use tokio::sync::{broadcast, mpsc};

use crate::agent_engine::graph::NodeId;
use crate::agent_engine::state::Status;

/// Progress notifications published by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CycleMessage {
    RunStarted {
        run_id: String,
        location: String,
    },
    NodeFinished {
        run_id: String,
        node: NodeId,
        step_idx: usize,
        status: Status,
        retries: u32,
    },
    RunFinished {
        run_id: String,
        status: Status,
    },
    RunAborted {
        run_id: String,
        node: Option<NodeId>,
        kind: String,
        message: String,
    },
}

/// Commands accepted by a running engine between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCommand {
    Stop,
}

pub struct EventBus {
    tx: broadcast::Sender<CycleMessage>,
    command_tx: mpsc::Sender<CycleCommand>,
    command_rx: mpsc::Receiver<CycleCommand>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        let (command_tx, command_rx) = mpsc::channel(8);

        Self {
            tx,
            command_tx,
            command_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleMessage> {
        self.tx.subscribe()
    }

    pub fn send(&self, msg: CycleMessage) -> Result<(), SendError<CycleMessage>> {
        self.tx.send(msg).map(|_| ())
    }

    /// Publish without caring whether anyone listens.
    pub fn publish(&self, msg: CycleMessage) {
        let _ = self.send(msg);
    }

    pub fn command_sender(&self) -> mpsc::Sender<CycleCommand> {
        self.command_tx.clone()
    }

    /// Non-blocking check for a pending stop request.
    pub fn stop_requested(&mut self) -> bool {
        matches!(self.command_rx.try_recv(), Ok(CycleCommand::Stop))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_messages() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(CycleMessage::RunFinished {
            run_id: "r1".into(),
            status: Status::Done,
        });
        match rx.recv().await.unwrap() {
            CycleMessage::RunFinished { run_id, status } => {
                assert_eq!(run_id, "r1");
                assert_eq!(status, Status::Done);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_command_is_observed_once() {
        let mut bus = EventBus::new();
        assert!(!bus.stop_requested());
        bus.command_sender().send(CycleCommand::Stop).await.unwrap();
        assert!(bus.stop_requested());
        assert!(!bus.stop_requested());
    }
}
