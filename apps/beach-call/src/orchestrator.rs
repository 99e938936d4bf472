//! The call orchestrator: owns local media and every peer link, and turns
//! signaling events, directory selections and media-session callbacks into
//! connection lifecycle changes.
//!
//! All mutable call state lives on the single task that drives [`CallOrchestrator::run`];
//! websocket pumps and peer-connection callbacks only reach it through queues.

use std::sync::Arc;

use call_signaling::{
    ClientEvent, IceCandidate, PeerId, ServerEvent, SessionDescription, SignalingTransport,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::connection::{
    CandidateDisposition, ConnectionHandler, HandlerEvent, NegotiationState, SessionEvent,
    SessionEvents, SessionFactory, TransportState,
};
use crate::directory::{UserDirectory, UserSelected};
use crate::error::{CallError, CallResult};
use crate::media::{CaptureProvider, LocalMedia, MediaConstraints, MediaSink, RemoteTrack};
use crate::registry::ConnectionRegistry;

/// Everything the orchestrator talks to, injected at construction.
pub struct Collaborators {
    pub signaling: Arc<dyn SignalingTransport>,
    pub capture: Arc<dyn CaptureProvider>,
    pub sessions: Arc<dyn SessionFactory>,
    pub directory: UserDirectory,
    pub local_sink: Arc<dyn MediaSink>,
    pub remote_sink: Arc<dyn MediaSink>,
}

enum Next {
    Signal(Option<ServerEvent>),
    Session(HandlerEvent),
    Selection(Result<UserSelected, broadcast::error::RecvError>),
}

pub struct CallOrchestrator {
    signaling: Arc<dyn SignalingTransport>,
    capture: Arc<dyn CaptureProvider>,
    sessions: Arc<dyn SessionFactory>,
    directory: UserDirectory,
    local_sink: Arc<dyn MediaSink>,
    remote_sink: Arc<dyn MediaSink>,
    local_media: Option<LocalMedia>,
    registry: ConnectionRegistry,
    next_handler_id: u64,
    auto_call: Option<PeerId>,
    session_tx: mpsc::UnboundedSender<HandlerEvent>,
    session_rx: mpsc::UnboundedReceiver<HandlerEvent>,
    selections: broadcast::Receiver<UserSelected>,
}

impl CallOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            signaling,
            capture,
            sessions,
            directory,
            local_sink,
            remote_sink,
        } = collaborators;
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let selections = directory.subscribe();
        Self {
            signaling,
            capture,
            sessions,
            directory,
            local_sink,
            remote_sink,
            local_media: None,
            registry: ConnectionRegistry::new(),
            next_handler_id: 1,
            auto_call: None,
            session_tx,
            session_rx,
            selections,
        }
    }

    /// Selects `peer` in the directory as soon as it shows up online, which
    /// places a call to it once.
    pub fn with_auto_call(mut self, peer: PeerId) -> Self {
        self.auto_call = Some(peer);
        self
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn local_media(&self) -> Option<&LocalMedia> {
        self.local_media.as_ref()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_state(&self, peer: &PeerId) -> Option<NegotiationState> {
        self.registry.get(peer).map(ConnectionHandler::state)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.registry.peers()
    }

    /// Acquires audio and video and shows them on the local preview.
    pub async fn start(&mut self) -> CallResult<()> {
        let media = self.capture.capture(MediaConstraints::audio_video()).await?;
        info!(target = "call", stream = %media.stream(), tracks = media.tracks().len(), "local media started");
        self.local_sink.attach(media.stream().clone());
        self.local_media = Some(media);
        Ok(())
    }

    /// Opens a link to `peer`, creates an offer and sends it as `call-user`.
    pub async fn place_call(&mut self, peer: PeerId) -> CallResult<()> {
        if self.local_media.is_none() {
            return Err(CallError::NoLocalMedia);
        }
        let mut handler = self.open_handler(&peer).await?;
        let offer = match handler.create_offer().await {
            Ok(offer) => offer,
            Err(err) => {
                handler.close().await;
                return Err(CallError::connection(&peer, err));
            }
        };
        info!(target = "call", peer = %peer, "calling user");
        if let Err(err) = self.signaling.emit(ClientEvent::CallUser {
            offer,
            to: peer.clone(),
        }) {
            handler.close().await;
            return Err(err.into());
        }
        self.install(handler).await;
        Ok(())
    }

    /// Drives the orchestrator until the signaling channel closes, then
    /// closes every open link.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<ServerEvent>) -> CallResult<()> {
        loop {
            let next = tokio::select! {
                event = inbound.recv() => Next::Signal(event),
                Some(event) = self.session_rx.recv() => Next::Session(event),
                selection = self.selections.recv() => Next::Selection(selection),
            };
            match next {
                Next::Signal(Some(event)) => self.handle_signal(event).await,
                Next::Signal(None) => {
                    info!(target = "call", "signaling channel closed");
                    break;
                }
                Next::Session(event) => self.handle_session_event(event).await,
                Next::Selection(Ok(selection)) => self.handle_selection(selection).await,
                Next::Selection(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(target = "call", skipped, "dropped user selections");
                }
                Next::Selection(Err(broadcast::error::RecvError::Closed)) => {}
            }
        }
        self.shutdown().await;
        Ok(())
    }

    pub async fn handle_signal(&mut self, event: ServerEvent) {
        trace!(target = "call", event = event.name(), "signal received");
        match event {
            ServerEvent::CallMade { offer, socket } => self.on_call_made(offer, socket).await,
            ServerEvent::AnswerMade { answer, socket } => self.on_answer_made(answer, socket).await,
            ServerEvent::IceCandidatePost { candidate, socket } => {
                self.on_remote_candidate(candidate, socket).await
            }
            ServerEvent::UpdateUserList { users } => self.on_user_list(users),
            ServerEvent::RemoveUser { socket_id } => self.on_user_removed(socket_id).await,
        }
    }

    pub async fn handle_selection(&mut self, selection: UserSelected) {
        if let Err(err) = self.place_call(selection.user.clone()).await {
            warn!(target = "call", peer = %selection.user, error = %err, "could not place call");
        }
    }

    pub async fn handle_session_event(&mut self, event: HandlerEvent) {
        let HandlerEvent {
            handler_id,
            peer,
            event,
        } = event;
        if !self.registry.contains_id(handler_id) {
            trace!(target = "call", peer = %peer, handler_id, "event from retired connection");
            return;
        }
        match event {
            SessionEvent::LocalCandidate(candidate) => {
                self.emit(ClientEvent::IceCandidate {
                    candidate,
                    to: peer,
                });
            }
            SessionEvent::RemoteTrack(track) => self.on_remote_track(&peer, track),
            SessionEvent::StateChanged(state) => {
                if let Some(handler) = self.registry.get_by_id_mut(handler_id) {
                    handler.mark_transport(state);
                }
                match state {
                    TransportState::Connected => {
                        info!(target = "call", peer = %peer, "media connected");
                    }
                    TransportState::Failed => {
                        warn!(target = "call", peer = %peer, "ice negotiation failed; removing connection");
                        self.evict(handler_id).await;
                    }
                    TransportState::Closed => {
                        debug!(target = "call", peer = %peer, "connection closed");
                        self.evict(handler_id).await;
                    }
                    other => {
                        debug!(target = "call", peer = %peer, state = %other, "transport state");
                    }
                }
            }
        }
    }

    /// Handles every session event already queued without waiting for more.
    pub async fn pump_session_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.session_rx.try_recv() {
            self.handle_session_event(event).await;
            handled += 1;
        }
        handled
    }

    async fn on_call_made(&mut self, offer: SessionDescription, caller: PeerId) {
        info!(target = "call", peer = %caller, "call made");
        if self.local_media.is_none() {
            warn!(target = "call", peer = %caller, "answering without local media");
        }
        let mut handler = match self.open_handler(&caller).await {
            Ok(handler) => handler,
            Err(err) => {
                warn!(target = "call", peer = %caller, error = %err, "could not open connection for incoming call");
                return;
            }
        };
        match handler.create_answer(offer).await {
            Ok(answer) => {
                self.install(handler).await;
                self.emit(ClientEvent::MakeAnswer {
                    answer,
                    to: caller,
                });
            }
            Err(err) => {
                warn!(target = "call", peer = %caller, error = %err, "could not answer call");
                handler.close().await;
            }
        }
    }

    async fn on_answer_made(&mut self, answer: SessionDescription, sender: Option<PeerId>) {
        let handler = match &sender {
            Some(peer) => self.registry.get_mut(peer),
            None => self.registry.sole_awaiting_answer_mut(),
        };
        let Some(handler) = handler else {
            warn!(target = "call", sender = ?sender, "answer made for no waiting connection");
            return;
        };
        let peer = handler.peer().clone();
        let handler_id = handler.id();
        if let Err(err) = handler.set_answer(answer).await {
            warn!(target = "call", peer = %peer, error = %err, "failed to apply answer");
            return;
        }
        info!(target = "call", peer = %peer, "answer made");
        if let Err(err) = handler.flush_pending_candidates().await {
            warn!(target = "call", peer = %peer, error = %err, "queued ice candidate rejected; removing connection");
            self.evict(handler_id).await;
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate, sender: Option<PeerId>) {
        let handler = match &sender {
            Some(peer) => self.registry.get_mut(peer),
            None => self.registry.sole_mut(),
        };
        let Some(handler) = handler else {
            debug!(target = "call", sender = ?sender, "ice candidate for no known connection");
            return;
        };
        let peer = handler.peer().clone();
        let handler_id = handler.id();
        match handler.add_ice_candidate(candidate).await {
            Ok(CandidateDisposition::Applied) => {
                trace!(target = "call", peer = %peer, "remote ice candidate applied");
            }
            Ok(CandidateDisposition::Queued) => {
                debug!(target = "call", peer = %peer, "remote ice candidate queued until answer");
            }
            Err(err) => {
                warn!(target = "call", peer = %peer, error = %err, "failed to add ice candidate; removing connection");
                self.evict(handler_id).await;
            }
        }
    }

    fn on_user_list(&mut self, users: Vec<PeerId>) {
        self.directory.update_user_list(&users);
        let wanted = match &self.auto_call {
            Some(peer) if users.contains(peer) => peer.clone(),
            _ => return,
        };
        self.auto_call = None;
        if let Err(err) = self.directory.select(&wanted) {
            warn!(target = "call", peer = %wanted, error = %err, "auto call selection failed");
        }
    }

    async fn on_user_removed(&mut self, user: PeerId) {
        self.directory.remove_user(&user);
        if let Some(mut handler) = self.registry.remove(&user) {
            info!(target = "call", peer = %user, "user left; closing connection");
            handler.close().await;
        }
    }

    fn on_remote_track(&mut self, peer: &PeerId, track: RemoteTrack) {
        if self.remote_sink.attached().as_ref() == Some(&track.stream) {
            return;
        }
        info!(target = "call", peer = %peer, stream = %track.stream, kind = %track.kind, "received remote stream");
        self.remote_sink.attach(track.stream);
    }

    async fn open_handler(&mut self, peer: &PeerId) -> CallResult<ConnectionHandler> {
        let handler_id = self.next_handler_id;
        self.next_handler_id += 1;
        let events = SessionEvents::new(handler_id, peer.clone(), self.session_tx.clone());
        let mut handler = ConnectionHandler::open(self.sessions.as_ref(), events)
            .await
            .map_err(|err| CallError::connection(peer, err))?;
        if let Some(media) = &self.local_media {
            if let Err(err) = handler.add_local_media(media).await {
                handler.close().await;
                return Err(CallError::connection(peer, err));
            }
        }
        Ok(handler)
    }

    async fn install(&mut self, handler: ConnectionHandler) {
        if let Some(mut previous) = self.registry.insert(handler) {
            warn!(
                target = "call",
                peer = %previous.peer(),
                state = %previous.state(),
                "replacing existing connection"
            );
            previous.close().await;
        }
    }

    async fn evict(&mut self, handler_id: u64) {
        if let Some(mut handler) = self.registry.remove_id(handler_id) {
            handler.close().await;
        }
    }

    fn emit(&self, event: ClientEvent) -> bool {
        let name = event.name();
        let to = event.recipient().clone();
        match self.signaling.emit(event) {
            Ok(()) => {
                trace!(target = "call", event = name, to = %to, "signal emitted");
                true
            }
            Err(err) => {
                warn!(target = "call", event = name, to = %to, error = %err, "signal emit failed");
                false
            }
        }
    }

    async fn shutdown(&mut self) {
        for mut handler in self.registry.drain() {
            handler.close().await;
        }
    }
}
