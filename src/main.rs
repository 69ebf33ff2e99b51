//! Demo entry point: spins up an `AgentManager`, wires two agents, and
//! exchanges a direct message and a broadcast.

use anyhow::Result;
use async_trait::async_trait;
use multi_agent_network::{Agent, AgentManager, Message, MessageHandler, MessagingConfig};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct LoggingHandler {
    label: &'static str,
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: Message) {
        info!(label = self.label, payload = %message.payload(), "received message");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting multi_agent_network demo");

    let config = MessagingConfig::development();
    let manager = AgentManager::new(&config);

    let a1 = manager.create_agent(None, None)?;
    let a2 = manager.create_agent(None, None)?;

    if let Some(agent) = manager.get_agent(a2) {
        register_greeting_handler(&agent)?;
    }

    manager
        .send_message(a1, a2, "greeting", json!({"text": "hello"}))
        .await?;

    let recipients = manager
        .broadcast_message(a1, "announce", json!({"event": "startup"}))
        .await?;
    info!(recipients = recipients.len(), "broadcast delivered");

    Ok(())
}

fn register_greeting_handler(agent: &Agent) -> Result<()> {
    agent.on_message(Arc::new(LoggingHandler { label: "a2" }))?;
    Ok(())
}
