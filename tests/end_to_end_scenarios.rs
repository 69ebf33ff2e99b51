//! End-to-end scenarios exercising agents, pub/sub, direct send/broadcast,
//! request/response correlation, and circuit breaker recovery together
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use multi_agent_network::{
    AgentManager, CircuitState, HealthMonitor, Message, MessageHandler, MessagePattern,
    MessagingConfig, MessagingSystemContainer,
};
use serde_json::json;

#[derive(Debug)]
struct CapturingHandler {
    received: std::sync::Mutex<Vec<Message>>,
}

impl CapturingHandler {
    fn new() -> Self {
        Self {
            received: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageHandler for CapturingHandler {
    async fn handle(&self, message: Message) {
        self.received.lock().unwrap().push(message);
    }
}

#[tokio::test]
async fn direct_send_delivers_only_to_the_named_recipient() {
    let config = MessagingConfig::testing();
    let manager = AgentManager::new(&config);
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();
    let a3 = manager.create_agent(None, None).unwrap();

    let handler_a2 = Arc::new(CapturingHandler::new());
    let handler_a3 = Arc::new(CapturingHandler::new());
    manager
        .get_agent(a2)
        .unwrap()
        .on_message(handler_a2.clone())
        .unwrap();
    manager
        .get_agent(a3)
        .unwrap()
        .on_message(handler_a3.clone())
        .unwrap();

    manager
        .send_message(a1, a2, "greeting", json!({"text": "hi"}))
        .await
        .unwrap();

    assert_eq!(handler_a2.count(), 1);
    assert_eq!(handler_a3.count(), 0);
}

#[tokio::test]
async fn broadcast_reaches_every_other_agent_but_not_the_sender() {
    let config = MessagingConfig::testing();
    let manager = AgentManager::new(&config);
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();
    let a3 = manager.create_agent(None, None).unwrap();

    let handler_a1 = Arc::new(CapturingHandler::new());
    let handler_a2 = Arc::new(CapturingHandler::new());
    let handler_a3 = Arc::new(CapturingHandler::new());
    for (agent, handler) in [(a1, &handler_a1), (a2, &handler_a2), (a3, &handler_a3)] {
        manager
            .get_agent(agent)
            .unwrap()
            .on_message(handler.clone())
            .unwrap();
    }

    let recipients = manager
        .broadcast_message(a1, "announce", json!({"text": "all hands"}))
        .await
        .unwrap();

    assert_eq!(recipients.len(), 2);
    assert!(recipients.contains(&a2));
    assert!(recipients.contains(&a3));
    assert_eq!(handler_a1.count(), 0);
    assert_eq!(handler_a2.count(), 1);
    assert_eq!(handler_a3.count(), 1);
}

#[tokio::test]
async fn wildcard_subscriptions_route_a_published_message_to_every_match() {
    let config = MessagingConfig::testing();
    let container = Arc::new(MessagingSystemContainer::create(&config));
    let manager = AgentManager::with_container(&config, Arc::clone(&container));
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();

    let a1_agent = manager.get_agent(a1).unwrap();
    let a2_agent = manager.get_agent(a2).unwrap();
    a1_agent
        .subscribe_to_messages(MessagePattern::try_new("test.*".to_string()).unwrap())
        .unwrap();
    a2_agent
        .subscribe_to_messages(MessagePattern::try_new("*.message".to_string()).unwrap())
        .unwrap();

    let handler_a1 = Arc::new(CapturingHandler::new());
    let handler_a2 = Arc::new(CapturingHandler::new());
    a1_agent.on_message(handler_a1.clone()).unwrap();
    a2_agent.on_message(handler_a2.clone()).unwrap();

    a1_agent
        .publish_message("test.message", json!({}), &manager)
        .await
        .unwrap();

    let subscribers = container
        .subscriptions()
        .get_subscribers("test.message")
        .await;
    assert_eq!(subscribers.len(), 2);
    assert_eq!(handler_a1.count(), 1);
    assert_eq!(handler_a2.count(), 1);
}

#[derive(Debug)]
struct ReplyingHandler {
    manager: Arc<AgentManager>,
    replier_id: multi_agent_network::AgentId,
    replied: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageHandler for ReplyingHandler {
    async fn handle(&self, message: Message) {
        let replier = self.manager.get_agent(self.replier_id).unwrap();
        replier
            .reply(&message, "q.reply", json!({"y": 2}), self.manager.as_ref())
            .await
            .unwrap();
        self.replied.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn request_response_resolves_to_the_reply_payload() {
    let config = MessagingConfig::testing();
    let manager = Arc::new(AgentManager::new(&config));
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();

    let replied = Arc::new(AtomicUsize::new(0));
    manager
        .get_agent(a2)
        .unwrap()
        .on_message(Arc::new(ReplyingHandler {
            manager: Arc::clone(&manager),
            replier_id: a2,
            replied: Arc::clone(&replied),
        }))
        .unwrap();

    let a1_agent = manager.get_agent(a1).unwrap();
    let response = a1_agent
        .request(a2, "q", json!({"x": 1}), manager.as_ref(), Some(1_000))
        .await
        .unwrap();

    assert_eq!(response.message_type().as_ref(), "q.reply");
    assert_eq!(response.payload(), &json!({"y": 2}));
    assert_eq!(replied.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_times_out_when_nobody_replies() {
    let config = MessagingConfig::testing();
    let manager = AgentManager::new(&config);
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();

    let a1_agent = manager.get_agent(a1).unwrap();
    let result = a1_agent
        .request(a2, "q", json!({"x": 1}), &manager, Some(50))
        .await;

    assert!(result.is_err());
    assert_eq!(
        manager.container().correlation().get_stats().pending_count,
        0
    );
}

#[tokio::test]
async fn circuit_breaker_opens_then_recovers_through_half_open() {
    let monitor = HealthMonitor::new(
        multi_agent_network::CircuitBreakerThreshold::try_new(10).unwrap(),
    );

    for _ in 0..10 {
        monitor.record_failure("X", "synthetic failure".to_string());
    }
    assert_eq!(monitor.circuit_state("X"), Some(CircuitState::Open));
    assert!(!monitor.get_component_health("X").unwrap().healthy);

    monitor.attempt_recovery("X").unwrap();
    assert_eq!(monitor.circuit_state("X"), Some(CircuitState::HalfOpen));

    monitor.record_health("X", Some("ok".to_string()));
    assert_eq!(monitor.circuit_state("X"), Some(CircuitState::Closed));
    assert_eq!(monitor.get_component_health("X").unwrap().failure_count, 0);
}

#[tokio::test]
async fn destroying_an_agent_cancels_its_pending_requests() {
    let config = MessagingConfig::testing();
    let manager = Arc::new(AgentManager::new(&config));
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();

    let request = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            let a1_agent = manager.get_agent(a1).unwrap();
            a1_agent
                .request(a2, "q", json!({}), manager.as_ref(), Some(5_000))
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.destroy_agent(a1).unwrap();

    let result = request.await.unwrap();
    assert!(result.is_err());
}
