//! The call signaling engine.
//!
//! All coordination flows through the shared session record: the caller
//! writes it with an offer, the receiver attaches an answer and flips the
//! status, and either side drives it to a terminal state. The engine reacts
//! to store snapshots, so a remote hang-up tears down local media exactly
//! like a local one.

use serde_json::json;
use tracing::{debug, info, warn};

use courier_shared::time::now_millis;
use courier_shared::types::{CallId, CallKind, CallStatus, UserId};
use courier_store::{
    paths, to_fields, CallSessionRecord, DocPath, FieldOp, FieldPath, Filter, Query, Snapshot,
    StoreHandle, Subscription,
};

use crate::error::{CallError, Result};
use crate::media::MediaSource;
use crate::session::{CallState, EndReason};

/// Transitions surfaced to the embedding shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// An inbound session started ringing and is now the pending call.
    Incoming {
        session: CallId,
        caller: UserId,
        kind: CallKind,
    },
    /// The receiver answered; negotiation completed and the call is live.
    Connected { session: CallId },
    /// The receiver rejected our outbound ring.
    Declined { session: CallId },
    /// The session reached a terminal state; local media was released.
    Ended { session: CallId, reason: EndReason },
}

pub struct CallEngine<M: MediaSource> {
    store: StoreHandle,
    user: UserId,
    media: M,
    state: CallState,
    /// Watches sessions that name us as receiver.
    inbound_sub: Option<Subscription>,
    /// Watches the record of the current call.
    session_sub: Option<Subscription>,
}

impl<M: MediaSource> CallEngine<M> {
    pub fn new(store: StoreHandle, user: UserId, media: M) -> Self {
        Self {
            store,
            user,
            media,
            state: CallState::Idle,
            inbound_sub: None,
            session_sub: None,
        }
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    /// Access to the media layer for device-level controls (mute and the
    /// like). The engine still owns release on termination.
    pub fn media(&self) -> &M {
        &self.media
    }

    /// Start watching for inbound calls.
    pub async fn watch_inbound(&mut self) -> Result<()> {
        let query = Query::collection(paths::CALLS)
            .filter(Filter::Eq(FieldPath::new("receiver"), json!(self.user)));
        self.inbound_sub = Some(self.store.subscribe(query).await?);
        Ok(())
    }

    /// Place a call. A media failure aborts before any signaling write; a
    /// signaling failure after media was acquired releases it first.
    pub async fn start_call(&mut self, peer: &UserId, kind: CallKind) -> Result<CallId> {
        if !self.state.can_start() {
            return Err(CallError::InvalidState("a call is already in progress"));
        }
        self.media.acquire(kind)?;
        let offer = match self.media.create_offer() {
            Ok(offer) => offer,
            Err(error) => {
                self.media.release();
                return Err(error.into());
            }
        };

        let record = CallSessionRecord {
            id: CallId::new(),
            caller: self.user.clone(),
            receiver: peer.clone(),
            status: CallStatus::Ringing,
            kind,
            offer,
            answer: None,
            created_at: now_millis(),
        };
        let path = DocPath::call(&record.id);
        let written = match to_fields(&record) {
            Ok(fields) => self.store.write(path.clone(), fields).await,
            Err(error) => Err(error),
        };
        if let Err(error) = written {
            self.media.release();
            return Err(CallError::Signaling(error));
        }
        match self.store.subscribe(Query::doc(path.clone())).await {
            Ok(sub) => self.session_sub = Some(sub),
            Err(error) => {
                self.media.release();
                let _ = self.store.delete(path).await;
                return Err(CallError::Signaling(error));
            }
        }

        info!(session = %record.id, peer = %peer, "outbound call ringing");
        self.state = CallState::RingingOutbound {
            session: record.id.clone(),
            peer: peer.clone(),
        };
        Ok(record.id)
    }

    /// Accept the pending inbound call: acquire media, attach the answer,
    /// flip the session to active.
    pub async fn accept(&mut self) -> Result<()> {
        let (session, peer, kind, offer) = match &self.state {
            CallState::RingingInbound {
                session,
                peer,
                kind,
                offer,
            } => (session.clone(), peer.clone(), *kind, offer.clone()),
            _ => return Err(CallError::InvalidState("no inbound call to accept")),
        };
        self.media.acquire(kind)?;
        let answer = match self.media.accept_offer(&offer) {
            Ok(answer) => answer,
            Err(error) => {
                self.media.release();
                return Err(error.into());
            }
        };
        let ops = vec![
            FieldOp::Set(FieldPath::new("answer"), json!(answer)),
            FieldOp::Set(FieldPath::new("status"), json!(CallStatus::Active)),
        ];
        if let Err(error) = self.store.update(DocPath::call(&session), ops).await {
            self.media.release();
            return Err(CallError::Signaling(error));
        }
        info!(session = %session, "call accepted");
        self.state = CallState::Active { session, peer };
        Ok(())
    }

    /// Decline the pending inbound call before accepting.
    pub async fn decline(&mut self) -> Result<()> {
        let session = match &self.state {
            CallState::RingingInbound { session, .. } => session.clone(),
            _ => return Err(CallError::InvalidState("no inbound call to decline")),
        };
        let result = self
            .store
            .update(
                DocPath::call(&session),
                vec![FieldOp::Set(
                    FieldPath::new("status"),
                    json!(CallStatus::Declined),
                )],
            )
            .await;
        self.teardown_session().await;
        self.state = CallState::Ended {
            session,
            reason: EndReason::Declined,
        };
        result.map_err(CallError::Signaling)
    }

    /// Hang up from any ringing or active state. Media is released
    /// deterministically even when the signaling write fails.
    pub async fn hang_up(&mut self) -> Result<()> {
        let session = match self.state.session() {
            Some(session) => session.clone(),
            None => return Err(CallError::InvalidState("no call in progress")),
        };
        let result = self
            .store
            .update(
                DocPath::call(&session),
                vec![FieldOp::Set(
                    FieldPath::new("status"),
                    json!(CallStatus::Ended),
                )],
            )
            .await;
        self.media.release();
        self.teardown_session().await;
        info!(session = %session, "call hung up");
        self.state = CallState::Ended {
            session,
            reason: EndReason::HungUp,
        };
        result.map_err(CallError::Signaling)
    }

    /// Pump the next store-driven transition. Runs until an event is due or
    /// every subscription has closed.
    pub async fn next_event(&mut self) -> Option<CallEvent> {
        loop {
            if self.inbound_sub.is_none() && self.session_sub.is_none() {
                return None;
            }
            tokio::select! {
                snapshot = recv(&mut self.inbound_sub) => match snapshot {
                    None => self.inbound_sub = None,
                    Some(snapshot) => {
                        if let Some(event) = self.on_inbound(snapshot).await {
                            return Some(event);
                        }
                    }
                },
                snapshot = recv(&mut self.session_sub) => match snapshot {
                    None => self.session_sub = None,
                    Some(snapshot) => {
                        if let Some(event) = self.on_session(snapshot).await {
                            return Some(event);
                        }
                    }
                },
            }
        }
    }

    async fn on_inbound(&mut self, snapshot: Snapshot) -> Option<CallEvent> {
        let ringing: Vec<CallSessionRecord> = snapshot
            .iter()
            .filter_map(|doc| doc.decode::<CallSessionRecord>().ok())
            .filter(|record| record.status == CallStatus::Ringing)
            .collect();

        for record in ringing {
            match &self.state {
                // Exactly one inbound session is surfaced at a time; a
                // concurrent ring is rejected busy, never silently
                // overwriting the pending call.
                CallState::RingingInbound { session, .. }
                | CallState::RingingOutbound { session, .. }
                | CallState::Active { session, .. }
                    if *session != record.id =>
                {
                    debug!(session = %record.id, "busy; declining concurrent inbound call");
                    let _ = self
                        .store
                        .update(
                            DocPath::call(&record.id),
                            vec![FieldOp::Set(
                                FieldPath::new("status"),
                                json!(CallStatus::Declined),
                            )],
                        )
                        .await;
                }
                CallState::Idle | CallState::Ended { .. } => {
                    match self
                        .store
                        .subscribe(Query::doc(DocPath::call(&record.id)))
                        .await
                    {
                        Ok(sub) => {
                            self.session_sub = Some(sub);
                            info!(session = %record.id, caller = %record.caller, "inbound call ringing");
                            self.state = CallState::RingingInbound {
                                session: record.id.clone(),
                                peer: record.caller.clone(),
                                kind: record.kind,
                                offer: record.offer.clone(),
                            };
                            return Some(CallEvent::Incoming {
                                session: record.id,
                                caller: record.caller,
                                kind: record.kind,
                            });
                        }
                        Err(error) => {
                            warn!(session = %record.id, %error, "failed to watch inbound session");
                        }
                    }
                }
                // Our already-surfaced session ringing again: nothing new.
                _ => {}
            }
        }
        None
    }

    async fn on_session(&mut self, snapshot: Snapshot) -> Option<CallEvent> {
        let session = self.state.session().cloned()?;
        let record = snapshot
            .first()
            .and_then(|doc| doc.decode::<CallSessionRecord>().ok());

        let record = match record {
            None => {
                // The record disappeared: identical to an ended transition.
                self.media.release();
                self.teardown_session().await;
                info!(session = %session, "session record gone; call dropped");
                self.state = CallState::Ended {
                    session: session.clone(),
                    reason: EndReason::Dropped,
                };
                return Some(CallEvent::Ended {
                    session,
                    reason: EndReason::Dropped,
                });
            }
            Some(record) if record.id != session => return None,
            Some(record) => record,
        };

        match record.status {
            CallStatus::Ringing => None,
            CallStatus::Active => {
                let CallState::RingingOutbound { peer, .. } = &self.state else {
                    return None;
                };
                let peer = peer.clone();
                // Active without an answer descriptor is half-written;
                // wait for the next snapshot.
                let answer = record.answer?;
                if let Err(error) = self.media.finalize(&answer) {
                    warn!(session = %session, %error, "answer negotiation failed");
                    self.media.release();
                    let _ = self
                        .store
                        .update(
                            DocPath::call(&session),
                            vec![FieldOp::Set(
                                FieldPath::new("status"),
                                json!(CallStatus::Ended),
                            )],
                        )
                        .await;
                    self.teardown_session().await;
                    self.state = CallState::Ended {
                        session: session.clone(),
                        reason: EndReason::HungUp,
                    };
                    return Some(CallEvent::Ended {
                        session,
                        reason: EndReason::HungUp,
                    });
                }
                info!(session = %session, "call connected");
                self.state = CallState::Active {
                    session: session.clone(),
                    peer,
                };
                Some(CallEvent::Connected { session })
            }
            CallStatus::Declined => {
                self.media.release();
                self.teardown_session().await;
                info!(session = %session, "call declined by receiver");
                self.state = CallState::Ended {
                    session: session.clone(),
                    reason: EndReason::Declined,
                };
                Some(CallEvent::Declined { session })
            }
            CallStatus::Ended => {
                self.media.release();
                self.teardown_session().await;
                info!(session = %session, "call ended by peer");
                self.state = CallState::Ended {
                    session: session.clone(),
                    reason: EndReason::HungUp,
                };
                Some(CallEvent::Ended {
                    session,
                    reason: EndReason::HungUp,
                })
            }
        }
    }

    async fn teardown_session(&mut self) {
        if let Some(mut sub) = self.session_sub.take() {
            sub.cancel().await;
        }
    }
}

async fn recv(sub: &mut Option<Subscription>) -> Option<Snapshot> {
    match sub {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}
