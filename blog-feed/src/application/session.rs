use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::data::identity::{IdentityProvider, RoleStore};
use crate::domain::user::{Session, ViewerContext};

/// Без сессии или с истёкшей сессией пользователь анонимен. Ошибка чтения
/// роли не фатальна.
pub async fn resolve_viewer<R>(roles: &R, session: Option<&Session>) -> ViewerContext
where
    R: RoleStore + ?Sized,
{
    let Some(session) = session.filter(|s| !s.is_expired_at(Utc::now())) else {
        return ViewerContext::anonymous();
    };

    match roles.role_of(session.user_id).await {
        Ok(role) => ViewerContext::for_role(role),
        Err(err) => {
            warn!(
                user_id = %session.user_id,
                error = %err,
                "role lookup failed, continuing unprivileged"
            );
            ViewerContext {
                user_id: Some(session.user_id),
                privileged: false,
            }
        }
    }
}

pub struct ViewerWatch {
    receiver: watch::Receiver<ViewerContext>,
    task: JoinHandle<()>,
}

impl ViewerWatch {
    pub async fn start<I, R>(identity: Arc<I>, roles: Arc<R>) -> Self
    where
        I: IdentityProvider + ?Sized + 'static,
        R: RoleStore + ?Sized + 'static,
    {
        let mut sessions = identity.session_changes();
        let session = sessions.borrow_and_update().clone();
        let initial = resolve_viewer(roles.as_ref(), session.as_ref()).await;
        let (sender, receiver) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = sessions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let session = sessions.borrow_and_update().clone();
                        let viewer = resolve_viewer(roles.as_ref(), session.as_ref()).await;
                        debug!(
                            signed_in = viewer.is_authenticated(),
                            privileged = viewer.privileged,
                            "viewer changed"
                        );
                        sender.send_if_modified(|current| {
                            let modified = *current != viewer;
                            *current = viewer;
                            modified
                        });
                    }
                    () = sender.closed() => break,
                }
            }
        });

        Self { receiver, task }
    }

    pub fn current(&self) -> ViewerContext {
        *self.receiver.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerContext> {
        self.receiver.clone()
    }
}

impl Drop for ViewerWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
