use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestId, RequestStatus, RequestType};

/// Emitted once per committed transition (step advance or terminal).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub request_id: RequestId,
    pub request_type: RequestType,
    pub subject_id: String,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Best-effort dispatch. The signature is infallible on purpose: a failed
/// notification must never roll back a committed transition, so delivery
/// errors stay inside the implementation.
pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, notice: TransitionNotice);
}

impl<N: NotificationDispatch + ?Sized> NotificationDispatch for Arc<N> {
    fn dispatch(&self, notice: TransitionNotice) {
        (**self).dispatch(notice);
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoopNotifier;

impl NotificationDispatch for NoopNotifier {
    fn dispatch(&self, _notice: TransitionNotice) {}
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    notices: Arc<Mutex<Vec<TransitionNotice>>>,
}

impl InMemoryNotifier {
    pub fn notices(&self) -> Vec<TransitionNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationDispatch for InMemoryNotifier {
    fn dispatch(&self, notice: TransitionNotice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}
