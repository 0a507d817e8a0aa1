//! Main Peer task implementation

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handle::PeerHandle;
use super::messages::{PeerMetrics, PeerRequest};
use crate::config::Config;
use crate::dialog::{DialogPresenter, PromptRenderer};
use crate::directory::{Directory, UserId};
use crate::notice::NotificationSink;
use crate::query::{QueryCoordinator, QueryStart};
use crate::relay::{DialogDone, Dispatch, Relay};
use crate::status::ObserverRequest;
use crate::transport::{Inbound, LinkSender, PeerLink};

/// One participant's protocol runtime
///
/// Owns the query coordinator and the relay, and is the only place either
/// is touched. Everything reaches it as a message: inbound frames, presence
/// changes, local requests, finished dialogs and status view requests.
pub struct Peer {
    user_id: UserId,
    link: PeerLink,
    sender: LinkSender,
    coordinator: QueryCoordinator,
    relay: Relay,
    presenter: DialogPresenter,
    query_ttl: Option<Duration>,
    tx: mpsc::Sender<PeerRequest>,
    rx: mpsc::Receiver<PeerRequest>,
    dialog_rx: mpsc::UnboundedReceiver<DialogDone>,
    observer_rx: mpsc::UnboundedReceiver<ObserverRequest>,
}

impl Peer {
    pub fn new(
        config: &Config,
        link: PeerLink,
        directory: Arc<dyn Directory>,
        renderer: Arc<dyn PromptRenderer>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let user_id = link.user_id().to_string();
        debug!(%user_id, "Peer::new: called");

        let sender = link.sender();
        let (tx, rx) = mpsc::channel(config.coordinator.channel_buffer);
        let (dialog_tx, dialog_rx) = mpsc::unbounded_channel();
        let (observer_tx, observer_rx) = mpsc::unbounded_channel();

        let presenter = DialogPresenter::new(renderer);
        let coordinator = QueryCoordinator::new(
            user_id.clone(),
            Arc::new(sender.clone()),
            Arc::clone(&directory),
            observer_tx,
        )
        .with_defaults(config.coordinator.default_show_status, config.dialog.prompt_config());
        let relay = Relay::new(
            user_id.clone(),
            presenter.clone(),
            Arc::new(sender.clone()),
            directory,
            sink,
            dialog_tx,
        );

        Self {
            user_id,
            link,
            sender,
            coordinator,
            relay,
            presenter,
            query_ttl: config.coordinator.query_ttl(),
            tx,
            rx,
            dialog_rx,
            observer_rx,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Create a handle for driving this peer
    pub fn handle(&self) -> PeerHandle {
        PeerHandle::new(self.tx.clone(), self.presenter.clone(), self.user_id.clone())
    }

    /// Spawn the peer task, returning a handle and the task
    pub fn spawn(self) -> (PeerHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the Peer task
    ///
    /// This consumes the Peer and runs until shutdown is requested or the
    /// transport goes away.
    pub async fn run(self) {
        let Peer {
            user_id,
            mut link,
            sender,
            mut coordinator,
            mut relay,
            presenter,
            query_ttl,
            tx,
            mut rx,
            mut dialog_rx,
            mut observer_rx,
        } = self;

        let mut metrics = PeerMetrics::default();

        info!(%user_id, "Peer started");

        loop {
            tokio::select! {
                inbound = link.recv() => match inbound {
                    Some(Inbound::Frame(frame)) => {
                        metrics.messages_received += 1;
                        match relay.receive(frame).await {
                            Dispatch::Submit { id, user_id, answers } => {
                                coordinator.add_response(&id, &user_id, answers);
                            }
                            Dispatch::Dropped => metrics.dropped_messages += 1,
                            Dispatch::Handled | Dispatch::Ignored => {}
                        }
                    }
                    Some(Inbound::Presence { user_id, connected }) => {
                        coordinator.user_activity(&user_id, connected);
                    }
                    None => {
                        info!(%user_id, "Transport closed");
                        break;
                    }
                },

                Some(done) = dialog_rx.recv() => relay.dialog_finished(done),

                Some(request) = observer_rx.recv() => coordinator.handle_observer(request),

                Some(request) = rx.recv() => match request {
                    PeerRequest::Query { request, options, reply_tx } => {
                        let result = coordinator.query(request, options);
                        if let (Ok(QueryStart::Pending(pending)), Some(ttl)) = (&result, query_ttl)
                            && let Some(generation) = coordinator.generation(&pending.id)
                        {
                            let timeout_tx = tx.clone();
                            let id = pending.id.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(ttl).await;
                                let _ = timeout_tx.send(PeerRequest::QueryExpired { id, generation }).await;
                            });
                        }
                        let _ = reply_tx.send(result);
                    }

                    PeerRequest::Requery { id, users, reply_tx } => {
                        let _ = reply_tx.send(coordinator.requery(&id, &users));
                    }

                    PeerRequest::Cancel { id, reply_tx } => {
                        let _ = reply_tx.send(coordinator.cancel(&id));
                    }

                    PeerRequest::Finish { id, reply_tx } => {
                        let _ = reply_tx.send(coordinator.finish(&id));
                    }

                    PeerRequest::Notify { id, user_id, content, include_privileged, reply_tx } => {
                        let _ = reply_tx.send(coordinator.notify(&id, &user_id, &content, include_privileged));
                    }

                    PeerRequest::Snapshot { id, reply_tx } => {
                        let _ = reply_tx.send(coordinator.get(&id));
                    }

                    PeerRequest::QueryExpired { id, generation } => {
                        if coordinator.expire(&id, generation) {
                            warn!(%id, "Query expired");
                        }
                    }

                    PeerRequest::GetMetrics { reply_tx } => {
                        let stats = coordinator.stats();
                        metrics.live_queries = coordinator.len();
                        metrics.open_dialogs = presenter.len().await;
                        metrics.messages_sent = sender.sent_count();
                        metrics.queries_resolved = stats.resolved;
                        metrics.queries_cancelled = stats.cancelled;
                        metrics.queries_expired = stats.expired;
                        let _ = reply_tx.send(metrics.clone());
                    }

                    PeerRequest::Shutdown => {
                        info!(%user_id, "Peer shutting down");
                        break;
                    }
                },
            }
        }

        for id in coordinator.ids() {
            coordinator.cancel(&id);
        }
        info!(%user_id, "Peer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Roster;
    use crate::protocol::{InputField, QueryRequest};
    use crate::query::QueryOptions;
    use crate::sim::{RecordingSink, Script, ScriptedRenderer};
    use crate::transport::BroadcastHub;
    use serde_json::json;

    fn hub() -> BroadcastHub {
        BroadcastHub::new(Roster::with_users(["gm", "alice"]), 64)
    }

    fn peer(hub: &BroadcastHub, user: &str, script: Script, config: &Config) -> (PeerHandle, JoinHandle<()>) {
        let link = hub.connect(user);
        Peer::new(
            config,
            link,
            Arc::new(hub.roster().clone()),
            Arc::new(ScriptedRenderer::new(script)),
            Arc::new(RecordingSink::new()),
        )
        .spawn()
    }

    fn request(id: &str) -> QueryRequest {
        QueryRequest::new("Stat Base")
            .with_id(id)
            .with_input(InputField::input("number", "Stat Base").with_key("statBase"))
    }

    #[tokio::test]
    async fn test_peer_query_roundtrip() {
        let hub = hub();
        let config = Config::default();
        let (gm, gm_task) = peer(&hub, "gm", Script::Close, &config);
        let (alice, alice_task) = peer(&hub, "alice", Script::answer(json!({"statBase": 3})), &config);

        let pending = gm
            .query(request("q-1"), QueryOptions::new())
            .await
            .unwrap()
            .into_pending()
            .unwrap();
        let responses = pending.wait().await.unwrap().unwrap();
        assert_eq!(responses["alice"], json!(3));

        let metrics = gm.metrics().await.unwrap();
        assert_eq!(metrics.live_queries, 0);
        assert_eq!(metrics.queries_resolved, 1);
        assert!(metrics.messages_sent >= 1);
        assert!(metrics.messages_received >= 1);

        gm.shutdown().await.unwrap();
        alice.shutdown().await.unwrap();
        gm_task.await.unwrap();
        alice_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_query_expires() {
        let hub = hub();
        let mut config = Config::default();
        config.coordinator.query_ttl_secs = Some(0);
        let (gm, _gm_task) = peer(&hub, "gm", Script::Close, &config);
        let (_alice, _alice_task) = peer(&hub, "alice", Script::Hold, &config);

        let pending = gm
            .query(request("q-1"), QueryOptions::new())
            .await
            .unwrap()
            .into_pending()
            .unwrap();
        let responses = pending.wait().await.unwrap().unwrap();
        assert!(responses.is_empty());

        let metrics = gm.metrics().await.unwrap();
        assert_eq!(metrics.queries_expired, 1);
    }

    #[tokio::test]
    async fn test_earlier_timer_does_not_expire_reused_id() {
        let hub = BroadcastHub::new(Roster::with_users(["gm", "alice", "bob"]), 64);
        let mut config = Config::default();
        config.coordinator.query_ttl_secs = Some(1);
        let (gm, _gm_task) = peer(&hub, "gm", Script::Close, &config);
        let (_alice, _alice_task) = peer(&hub, "alice", Script::answer(json!({"statBase": 2})), &config);
        let (_bob, _bob_task) = peer(&hub, "bob", Script::Hold, &config);

        let first = gm
            .query(request("q-1"), QueryOptions::new().with_users(["alice"]))
            .await
            .unwrap()
            .into_pending()
            .unwrap();
        assert_eq!(first.wait().await.unwrap().unwrap()["alice"], json!(2));

        tokio::time::sleep(Duration::from_millis(600)).await;
        let started = tokio::time::Instant::now();
        let second = gm
            .query(request("q-1"), QueryOptions::new().with_users(["bob"]))
            .await
            .unwrap()
            .into_pending()
            .unwrap();

        // First timer fires about 400ms in; the new query must outlive it
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(gm.snapshot("q-1").await.unwrap().is_some());

        let responses = tokio::time::timeout(Duration::from_secs(3), second.wait())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(responses.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(900));

        let metrics = gm.metrics().await.unwrap();
        assert_eq!(metrics.queries_expired, 1);
        assert_eq!(metrics.queries_resolved, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_live_queries() {
        let hub = hub();
        let config = Config::default();
        let (gm, gm_task) = peer(&hub, "gm", Script::Close, &config);
        let (_alice, _alice_task) = peer(&hub, "alice", Script::Hold, &config);

        let pending = gm
            .query(request("q-1"), QueryOptions::new())
            .await
            .unwrap()
            .into_pending()
            .unwrap();
        assert!(gm.snapshot("q-1").await.unwrap().is_some());

        gm.shutdown().await.unwrap();
        gm_task.await.unwrap();
        assert!(pending.wait().await.unwrap().is_none());
        assert!(matches!(gm.metrics().await, Err(crate::error::CanvassError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_validation_error_reaches_caller() {
        let hub = hub();
        let (gm, _task) = peer(&hub, "gm", Script::Close, &Config::default());

        let mut req = request("q-1");
        req.id = None;
        let err = gm.query(req, QueryOptions::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::CanvassError::Validation(_)));
    }
}
