//! Turns injected on behalf of the activity tracker.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::activity::ProactiveAction;
use crate::conversation::MessageLog;
use crate::error::ParleyError;
use crate::realtime::{ConversationItem, ResponseOptions, TurnSender};

pub const GREETING_INSTRUCTIONS: &str =
    "Greet the user warmly, briefly introduce yourself and ask how you can help.";
pub const NUDGE_PROMPT: &str =
    "The user has been quiet for a while. Gently check in, or continue the conversation.";

pub(crate) async fn perform<S: TurnSender + ?Sized>(
    sender: &S,
    action: ProactiveAction,
) -> Result<(), ParleyError> {
    match action {
        ProactiveAction::Greeting => {
            sender
                .generate_response(Some(ResponseOptions {
                    additional_instructions: Some(GREETING_INSTRUCTIONS.into()),
                }))
                .await
        }
        ProactiveAction::InactiveNudge => {
            sender
                .send_item(ConversationItem::system_text(NUDGE_PROMPT))
                .await?;
            sender.generate_response(None).await
        }
    }
}

pub(crate) fn spawn_action_loop<S>(
    sender: S,
    mut actions: mpsc::UnboundedReceiver<ProactiveAction>,
    log: MessageLog,
) -> JoinHandle<()>
where
    S: TurnSender + 'static,
{
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            tracing::info!(%action, "injecting proactive turn");
            if let Err(error) = perform(&sender, action).await {
                if sender.is_closed() {
                    tracing::debug!(%action, "transport gone, dropping proactive turns");
                    break;
                }
                tracing::warn!(%action, error = %error, "proactive turn failed");
                log.push_error(format!("Proactive turn failed: {error}"));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ClientEvent;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSender(Mutex<Vec<ClientEvent>>);

    #[async_trait]
    impl TurnSender for CapturingSender {
        async fn send_event(&self, event: ClientEvent) -> Result<(), ParleyError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn greeting_carries_additional_instructions() {
        let sender = CapturingSender::default();
        perform(&sender, ProactiveAction::Greeting).await.unwrap();

        let sent = sender.0.lock().unwrap();
        assert_eq!(
            *sent,
            vec![ClientEvent::ResponseCreate {
                response: Some(ResponseOptions {
                    additional_instructions: Some(GREETING_INSTRUCTIONS.into()),
                }),
            }]
        );
    }

    #[tokio::test]
    async fn nudge_adds_a_system_turn_before_the_request() {
        let sender = CapturingSender::default();
        perform(&sender, ProactiveAction::InactiveNudge).await.unwrap();

        let types: Vec<_> = sender
            .0
            .lock()
            .unwrap()
            .iter()
            .map(ClientEvent::event_type)
            .collect();
        assert_eq!(types, vec!["conversation.item.create", "response.create"]);
    }

    struct RejectingSender {
        closed: bool,
    }

    #[async_trait]
    impl TurnSender for RejectingSender {
        async fn send_event(&self, _event: ClientEvent) -> Result<(), ParleyError> {
            Err(ParleyError::Transport("Realtime transport is closed".into()))
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    async fn run_loop(sender: RejectingSender) -> MessageLog {
        let log = MessageLog::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_action_loop(sender, rx, log.clone());
        tx.send(ProactiveAction::Greeting).unwrap();
        tx.send(ProactiveAction::InactiveNudge).unwrap();
        drop(tx);
        handle.await.unwrap();
        log
    }

    #[tokio::test]
    async fn closed_transport_drops_queued_actions_silently() {
        let log = run_loop(RejectingSender { closed: true }).await;
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn failures_on_a_live_transport_are_logged() {
        let log = run_loop(RejectingSender { closed: false }).await;
        assert_eq!(log.count(crate::conversation::MessageKind::Error), 2);
    }
}
