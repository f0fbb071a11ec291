// ── Command constructors ──
//
// Plain data builders, one per operation. Each returns an uncategorized
// `Command`; label it with `Command::with_category`.

use blaze_backend::{
    AuthProvider, Credential, Password, Persistence, Priority, ProfileUpdate, UpdateFn, UserHandle,
};
use serde_json::{Map, Value};

use super::{Command, CommandKind};

// ── Session ──────────────────────────────────────────────────────────

pub fn apply_action_code(code: impl Into<String>) -> Command {
    CommandKind::ApplyActionCode { code: code.into() }.into()
}

pub fn check_action_code(code: impl Into<String>) -> Command {
    CommandKind::CheckActionCode { code: code.into() }.into()
}

pub fn confirm_password_reset(code: impl Into<String>, new_password: impl Into<String>) -> Command {
    CommandKind::ConfirmPasswordReset {
        code: code.into(),
        new_password: Password::new(new_password),
    }
    .into()
}

pub fn create_user_with_email_and_password(
    email: impl Into<String>,
    password: impl Into<String>,
) -> Command {
    CommandKind::CreateUserWithEmailAndPassword {
        email: email.into(),
        password: Password::new(password),
    }
    .into()
}

pub fn send_password_reset_email(email: impl Into<String>) -> Command {
    CommandKind::SendPasswordResetEmail {
        email: email.into(),
    }
    .into()
}

pub fn set_persistence(persistence: Persistence) -> Command {
    CommandKind::SetPersistence { persistence }.into()
}

pub fn sign_in_anonymously() -> Command {
    CommandKind::SignInAnonymously.into()
}

pub fn sign_in_with_credential(credential: Credential) -> Command {
    CommandKind::SignInWithCredential { credential }.into()
}

pub fn sign_in_with_custom_token(token: impl Into<String>) -> Command {
    CommandKind::SignInWithCustomToken {
        token: token.into(),
    }
    .into()
}

pub fn sign_in_with_email_and_password(
    email: impl Into<String>,
    password: impl Into<String>,
) -> Command {
    CommandKind::SignInWithEmailAndPassword {
        email: email.into(),
        password: Password::new(password),
    }
    .into()
}

pub fn sign_in_with_phone_number(
    phone_number: impl Into<String>,
    verifier: impl Into<String>,
) -> Command {
    CommandKind::SignInWithPhoneNumber {
        phone_number: phone_number.into(),
        verifier: verifier.into(),
    }
    .into()
}

pub fn sign_in_with_popup(provider: AuthProvider) -> Command {
    CommandKind::SignInWithPopup { provider }.into()
}

pub fn sign_in_with_redirect(provider: AuthProvider) -> Command {
    CommandKind::SignInWithRedirect { provider }.into()
}

pub fn sign_out() -> Command {
    CommandKind::SignOut.into()
}

pub fn verify_password_reset_code(code: impl Into<String>) -> Command {
    CommandKind::VerifyPasswordResetCode { code: code.into() }.into()
}

// ── Store ────────────────────────────────────────────────────────────

pub fn go_offline() -> Command {
    CommandKind::GoOffline.into()
}

pub fn go_online() -> Command {
    CommandKind::GoOnline.into()
}

// ── Reference ────────────────────────────────────────────────────────

pub fn set(ref_path: impl Into<String>, value: Value) -> Command {
    CommandKind::Set {
        ref_path: ref_path.into(),
        value,
    }
    .into()
}

pub fn push(ref_path: impl Into<String>, value: Value) -> Command {
    CommandKind::Push {
        ref_path: ref_path.into(),
        value,
    }
    .into()
}

pub fn remove(ref_path: impl Into<String>) -> Command {
    CommandKind::Remove {
        ref_path: ref_path.into(),
    }
    .into()
}

pub fn update(ref_path: impl Into<String>, values: Map<String, Value>) -> Command {
    CommandKind::Update {
        ref_path: ref_path.into(),
        values,
    }
    .into()
}

/// `update_fn` receives the current value (`Null` when absent) and
/// returns the replacement, or `None` to abort.
pub fn transaction(
    ref_path: impl Into<String>,
    update_fn: impl Fn(Value) -> Option<Value> + Send + Sync + 'static,
) -> Command {
    CommandKind::Transaction {
        ref_path: ref_path.into(),
        update_fn: UpdateFn::new(update_fn),
    }
    .into()
}

pub fn set_priority(ref_path: impl Into<String>, priority: Priority) -> Command {
    CommandKind::SetPriority {
        ref_path: ref_path.into(),
        priority,
    }
    .into()
}

pub fn set_with_priority(ref_path: impl Into<String>, value: Value, priority: Priority) -> Command {
    CommandKind::SetWithPriority {
        ref_path: ref_path.into(),
        value,
        priority,
    }
    .into()
}

// ── Principal ────────────────────────────────────────────────────────

pub fn unlink(user: UserHandle, provider_id: impl Into<String>) -> Command {
    CommandKind::Unlink {
        user,
        provider_id: provider_id.into(),
    }
    .into()
}

pub fn update_email(user: UserHandle, email: impl Into<String>) -> Command {
    CommandKind::UpdateEmail {
        user,
        email: email.into(),
    }
    .into()
}

pub fn update_password(user: UserHandle, new_password: impl Into<String>) -> Command {
    CommandKind::UpdatePassword {
        user,
        new_password: Password::new(new_password),
    }
    .into()
}

pub fn update_phone_number(user: UserHandle, credential: Credential) -> Command {
    CommandKind::UpdatePhoneNumber { user, credential }.into()
}

pub fn update_profile(user: UserHandle, profile: ProfileUpdate) -> Command {
    CommandKind::UpdateProfile { user, profile }.into()
}
