use anyhow::Result;

use gantry_core::Snapshot;

use crate::rest::MockRestApi;
use crate::state::MockBotState;
use crate::stream::MockStreamServer;

/// High-level interface for controlling the mock bot servers.
pub struct MockBot {
    state: MockBotState,
    rest: MockRestApi,
    stream: MockStreamServer,
}

impl MockBot {
    /// Spawns REST and push-stream servers seeded with the given snapshot.
    pub async fn start(initial: Snapshot) -> Result<Self> {
        let state = MockBotState::new(initial);
        let rest = MockRestApi::spawn(state.clone()).await?;
        let stream = MockStreamServer::spawn(state.clone()).await?;
        Ok(Self {
            state,
            rest,
            stream,
        })
    }

    #[must_use]
    pub fn rest_url(&self) -> String {
        self.rest.base_url()
    }

    #[must_use]
    pub fn ws_url(&self) -> String {
        self.stream.ws_url()
    }

    #[must_use]
    pub fn state(&self) -> MockBotState {
        self.state.clone()
    }

    /// Tear down the push stream, dropping every client connection.
    pub async fn kill_stream(&self) {
        self.stream.kill().await;
    }

    /// Restore the push stream on its original address.
    pub async fn restart_stream(&self) -> Result<()> {
        self.stream.restart().await
    }

    pub async fn shutdown(&mut self) {
        self.rest.shutdown().await;
        self.stream.shutdown().await;
    }
}
