// ── Action routing ──
//
// Maps each `CommandKind` to exactly one backend call. The backend method
// is invoked synchronously inside `dispatch`, which issues the operation;
// the returned future only reports its outcome. Calling `dispatch` in
// command order therefore issues backend calls in command order.

use std::sync::Arc;

use blaze_backend::{Backend, BackendFuture};
use futures_util::future::{self, BoxFuture};
use tracing::debug;

use crate::command::{Command, CommandKind, CommandOutput};
use crate::error::DriverError;
use crate::path;

/// Outcome of a dispatched command, resolved once the backend answers.
pub type PendingOutcome = BoxFuture<'static, Result<CommandOutput, DriverError>>;

/// Routes commands to backend operations.
#[derive(Clone)]
pub struct ActionRouter {
    backend: Arc<dyn Backend>,
}

impl ActionRouter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Issue the backend call for `command` and return its pending
    /// outcome. Never panics: an unrecognized command yields a failed
    /// outcome without touching the backend.
    pub fn dispatch(&self, command: &Command) -> PendingOutcome {
        debug!(tag = command.tag(), category = ?command.category(), "dispatching command");
        let backend = self.backend.as_ref();

        match &command.kind {
            // ── Session operations ───────────────────────────────────

            CommandKind::ApplyActionCode { code } => settle(backend.apply_action_code(code), done),

            CommandKind::CheckActionCode { code } => {
                settle(backend.check_action_code(code), CommandOutput::ActionCode)
            }

            CommandKind::ConfirmPasswordReset { code, new_password } => {
                settle(backend.confirm_password_reset(code, new_password), done)
            }

            CommandKind::CreateUserWithEmailAndPassword { email, password } => settle(
                backend.create_user_with_email_and_password(email, password),
                CommandOutput::Credential,
            ),

            CommandKind::SendPasswordResetEmail { email } => {
                settle(backend.send_password_reset_email(email), done)
            }

            CommandKind::SetPersistence { persistence } => {
                settle(backend.set_persistence(*persistence), done)
            }

            CommandKind::SignInAnonymously => {
                settle(backend.sign_in_anonymously(), CommandOutput::Credential)
            }

            CommandKind::SignInWithCredential { credential } => settle(
                backend.sign_in_with_credential(credential),
                CommandOutput::Credential,
            ),

            CommandKind::SignInWithCustomToken { token } => settle(
                backend.sign_in_with_custom_token(token),
                CommandOutput::Credential,
            ),

            CommandKind::SignInWithEmailAndPassword { email, password } => settle(
                backend.sign_in_with_email_and_password(email, password),
                CommandOutput::Credential,
            ),

            CommandKind::SignInWithPhoneNumber {
                phone_number,
                verifier,
            } => settle(
                backend.sign_in_with_phone_number(phone_number, verifier),
                |verification_id| CommandOutput::Verification { verification_id },
            ),

            CommandKind::SignInWithPopup { provider } => {
                settle(backend.sign_in_with_popup(provider), CommandOutput::Credential)
            }

            CommandKind::SignInWithRedirect { provider } => {
                settle(backend.sign_in_with_redirect(provider), done)
            }

            CommandKind::SignOut => settle(backend.sign_out(), done),

            CommandKind::VerifyPasswordResetCode { code } => {
                settle(backend.verify_password_reset_code(code), CommandOutput::Email)
            }

            // ── Store operations ─────────────────────────────────────

            CommandKind::GoOffline => {
                backend.go_offline();
                completed()
            }

            CommandKind::GoOnline => {
                backend.go_online();
                completed()
            }

            // ── Reference operations ─────────────────────────────────

            CommandKind::Set { ref_path, value } => {
                settle(backend.set(&path::normalize(ref_path), value), done)
            }

            CommandKind::Push { ref_path, value } => {
                let parent = path::normalize(ref_path);
                let issued = backend.push(&parent, value);
                settle(issued, move |key| CommandOutput::Pushed {
                    path: path::join(&parent, &key),
                    key,
                })
            }

            CommandKind::Remove { ref_path } => {
                settle(backend.remove(&path::normalize(ref_path)), done)
            }

            CommandKind::Update { ref_path, values } => {
                settle(backend.update(&path::normalize(ref_path), values), done)
            }

            CommandKind::Transaction {
                ref_path,
                update_fn,
            } => settle(
                backend.transaction(&path::normalize(ref_path), update_fn.clone()),
                CommandOutput::Transaction,
            ),

            CommandKind::SetPriority { ref_path, priority } => {
                settle(backend.set_priority(&path::normalize(ref_path), priority), done)
            }

            CommandKind::SetWithPriority {
                ref_path,
                value,
                priority,
            } => settle(
                backend.set_with_priority(&path::normalize(ref_path), value, priority),
                done,
            ),

            // ── Principal operations ─────────────────────────────────

            CommandKind::Unlink { user, provider_id } => {
                settle(backend.unlink(user, provider_id), CommandOutput::User)
            }

            CommandKind::UpdateEmail { user, email } => {
                settle(backend.update_email(user, email), done)
            }

            CommandKind::UpdatePassword { user, new_password } => {
                settle(backend.update_password(user, new_password), done)
            }

            CommandKind::UpdatePhoneNumber { user, credential } => {
                settle(backend.update_phone_number(user, credential), done)
            }

            CommandKind::UpdateProfile { user, profile } => {
                settle(backend.update_profile(user, profile), done)
            }

            CommandKind::Unrecognized { tag } => {
                debug!(tag, "no route for command");
                Box::pin(future::ready(Err(DriverError::UnknownCommand {
                    tag: tag.clone(),
                })))
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Map a backend future's success value; backend failures become
/// [`DriverError::BackendOperation`] unchanged.
fn settle<T, F>(issued: BackendFuture<T>, map: F) -> PendingOutcome
where
    T: Send + 'static,
    F: FnOnce(T) -> CommandOutput + Send + 'static,
{
    Box::pin(async move { issued.await.map(map).map_err(DriverError::BackendOperation) })
}

#[allow(clippy::needless_pass_by_value)]
fn done(_: ()) -> CommandOutput {
    CommandOutput::Done
}

fn completed() -> PendingOutcome {
    Box::pin(future::ready(Ok(CommandOutput::Done)))
}
