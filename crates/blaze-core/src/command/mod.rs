// ── Command API ──
//
// Every backend operation flows through an immutable `Command` value:
// a closed `CommandKind` plus an optional caller-assigned category used
// to filter the merged result stream. The router matches on the kind
// exhaustively, so adding a variant is a compile error until it is routed.

pub mod factory;

use std::fmt;

use blaze_backend::{
    ActionCodeInfo, AuthProvider, Credential, Password, Persistence, Priority, ProfileUpdate,
    TransactionOutcome, UpdateFn, User, UserCredential, UserHandle,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{IntoStaticStr, VariantNames};

/// One backend operation to perform.
///
/// Commands carry no identity beyond their fields and no backend handle.
/// JSON form: `{"tag": "<Variant>", "category": "...", ...fields}` with
/// camelCase field names.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Label used by [`Source::select`](crate::Source::select).
    pub category: Option<String>,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            category: None,
            kind,
        }
    }

    /// A copy of this command under `category`. The original is unchanged.
    #[must_use]
    pub fn with_category(&self, category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            kind: self.kind.clone(),
        }
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Variant name, or the unrecognized tag as decoded.
    pub fn tag(&self) -> &str {
        match &self.kind {
            CommandKind::Unrecognized { tag } => tag,
            kind => {
                let name: &'static str = kind.into();
                name
            }
        }
    }
}

impl From<CommandKind> for Command {
    fn from(kind: CommandKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{} [{category}]", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

/// All operations the driver can route to a backend.
#[derive(Debug, Clone, PartialEq, Deserialize, IntoStaticStr, VariantNames)]
#[serde(tag = "tag", rename_all_fields = "camelCase")]
pub enum CommandKind {
    // ── Session operations ───────────────────────────────────────────
    ApplyActionCode {
        code: String,
    },
    CheckActionCode {
        code: String,
    },
    ConfirmPasswordReset {
        code: String,
        new_password: Password,
    },
    CreateUserWithEmailAndPassword {
        email: String,
        password: Password,
    },
    SendPasswordResetEmail {
        email: String,
    },
    SetPersistence {
        persistence: Persistence,
    },
    SignInAnonymously,
    SignInWithCredential {
        credential: Credential,
    },
    SignInWithCustomToken {
        token: String,
    },
    SignInWithEmailAndPassword {
        email: String,
        password: Password,
    },
    SignInWithPhoneNumber {
        phone_number: String,
        verifier: String,
    },
    SignInWithPopup {
        provider: AuthProvider,
    },
    SignInWithRedirect {
        provider: AuthProvider,
    },
    SignOut,
    VerifyPasswordResetCode {
        code: String,
    },

    // ── Store operations ─────────────────────────────────────────────
    GoOffline,
    GoOnline,

    // ── Reference operations ─────────────────────────────────────────
    Set {
        ref_path: String,
        value: Value,
    },
    Push {
        ref_path: String,
        value: Value,
    },
    Remove {
        ref_path: String,
    },
    Update {
        ref_path: String,
        values: Map<String, Value>,
    },
    /// Not decodable from JSON: the update function is a closure.
    #[serde(skip)]
    Transaction {
        ref_path: String,
        update_fn: UpdateFn,
    },
    SetPriority {
        ref_path: String,
        priority: Priority,
    },
    SetWithPriority {
        ref_path: String,
        value: Value,
        priority: Priority,
    },

    // ── Principal operations ─────────────────────────────────────────
    Unlink {
        user: UserHandle,
        provider_id: String,
    },
    UpdateEmail {
        user: UserHandle,
        email: String,
    },
    UpdatePassword {
        user: UserHandle,
        new_password: Password,
    },
    UpdatePhoneNumber {
        user: UserHandle,
        credential: Credential,
    },
    UpdateProfile {
        user: UserHandle,
        profile: ProfileUpdate,
    },

    /// A decoded command whose tag names no operation. Dispatching it
    /// fails its Result Stream with
    /// [`DriverError::UnknownCommand`](crate::DriverError::UnknownCommand).
    #[serde(skip)]
    Unrecognized { tag: String },
}

const UNRECOGNIZED: &str = "Unrecognized";
const TRANSACTION: &str = "Transaction";

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let Value::Object(fields) = &mut value else {
            return Err(D::Error::custom("command must be a JSON object"));
        };

        let category = match fields.remove("category") {
            None | Some(Value::Null) => None,
            Some(Value::String(category)) => Some(category),
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "command category must be a string, got {other}"
                )));
            }
        };

        let tag = match fields.get("tag") {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(D::Error::custom("command is missing a string `tag` field")),
        };

        if tag == TRANSACTION {
            return Err(D::Error::custom(
                "Transaction commands carry an update function and cannot be decoded from JSON",
            ));
        }

        let routable = tag != UNRECOGNIZED && CommandKind::VARIANTS.iter().any(|v| *v == tag);
        let kind = if routable {
            CommandKind::deserialize(value).map_err(D::Error::custom)?
        } else {
            CommandKind::Unrecognized { tag }
        };
        Ok(Self { category, kind })
    }
}

// ── Command outcomes ─────────────────────────────────────────────────

/// Success value carried by a Result Stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandOutput {
    /// The operation completed without a payload.
    Done,
    Credential(UserCredential),
    ActionCode(ActionCodeInfo),
    /// Email address a password reset code was issued for.
    Email(String),
    /// Pending phone sign-in; confirm with a phone [`Credential`].
    #[serde(rename_all = "camelCase")]
    Verification { verification_id: String },
    /// Key generated by a push, and the full path it was written to.
    Pushed { key: String, path: String },
    Transaction(TransactionOutcome),
    /// Principal after an unlink.
    User(User),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_reference_command() {
        let cmd: Command = serde_json::from_value(json!({
            "tag": "Set",
            "refPath": "users/1",
            "value": {"name": "a"}
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::new(CommandKind::Set {
                ref_path: "users/1".into(),
                value: json!({"name": "a"}),
            })
        );
        assert_eq!(cmd.tag(), "Set");
    }

    #[test]
    fn decode_category_and_camel_case_fields() {
        let cmd: Command = serde_json::from_value(json!({
            "tag": "SignInWithPhoneNumber",
            "category": "login",
            "phoneNumber": "+15550100",
            "verifier": "recaptcha"
        }))
        .unwrap();
        assert_eq!(cmd.category(), Some("login"));
        assert!(matches!(
            cmd.kind,
            CommandKind::SignInWithPhoneNumber { ref phone_number, .. } if phone_number == "+15550100"
        ));
    }

    #[test]
    fn unknown_tag_decodes_to_unrecognized() {
        let cmd: Command = serde_json::from_value(json!({"tag": "NoSuchKind"})).unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Unrecognized {
                tag: "NoSuchKind".into()
            }
        );
        assert_eq!(cmd.tag(), "NoSuchKind");

        let literal: Command = serde_json::from_value(json!({"tag": "Unrecognized"})).unwrap();
        assert_eq!(literal.tag(), "Unrecognized");
    }

    #[test]
    fn known_tag_with_bad_fields_is_an_error() {
        let err = serde_json::from_value::<Command>(json!({"tag": "Set"})).unwrap_err();
        assert!(err.to_string().contains("refPath"), "{err}");
    }

    #[test]
    fn transaction_is_not_decodable() {
        let err = serde_json::from_value::<Command>(json!({"tag": "Transaction", "refPath": "a"}))
            .unwrap_err();
        assert!(err.to_string().contains("update function"), "{err}");
    }

    #[test]
    fn missing_tag_is_an_error() {
        assert!(serde_json::from_value::<Command>(json!({"refPath": "a"})).is_err());
        assert!(serde_json::from_value::<Command>(json!([1, 2])).is_err());
    }

    #[test]
    fn with_category_leaves_original_untouched() {
        let original = Command::new(CommandKind::SignOut);
        let labelled = original.with_category("logout");
        assert_eq!(original.category(), None);
        assert_eq!(labelled.category(), Some("logout"));
        assert_eq!(labelled.kind, original.kind);
        assert_eq!(labelled.to_string(), "SignOut [logout]");
    }

    #[test]
    fn output_serializes_adjacently_tagged() {
        let out = CommandOutput::Pushed {
            key: "-Nabc".into(),
            path: "msgs/-Nabc".into(),
        };
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"type": "pushed", "value": {"key": "-Nabc", "path": "msgs/-Nabc"}})
        );
        assert_eq!(
            serde_json::to_value(CommandOutput::Done).unwrap(),
            json!({"type": "done"})
        );
    }
}
