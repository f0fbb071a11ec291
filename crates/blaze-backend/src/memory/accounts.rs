// ── In-memory account registry ──
//
// Principals, provider links, issued action codes and pending phone
// verifications. Every method is synchronous and returns the same error
// codes the hosted session service uses.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::BackendError;
use crate::types::{
    ActionCodeInfo, ActionCodeOperation, Credential, Password, Persistence, ProfileUpdate, User,
    UserCredential, UserHandle,
};

const MIN_PASSWORD_LEN: usize = 6;
const PASSWORD_PROVIDER: &str = "password";
const PHONE_PROVIDER: &str = "phone";
const CUSTOM_PROVIDER: &str = "custom";

struct Account {
    user: User,
    password: Option<String>,
}

struct IssuedCode {
    operation: ActionCodeOperation,
    email: String,
}

struct PhoneVerification {
    phone_number: String,
    code: String,
}

#[derive(Default)]
pub(crate) struct Accounts {
    by_uid: HashMap<String, Account>,
    /// `(provider_id, subject)` -> uid for federated / phone / custom links.
    links: HashMap<(String, String), String>,
    current: Option<String>,
    codes: HashMap<String, IssuedCode>,
    verifications: HashMap<String, PhoneVerification>,
    persistence: Persistence,
    sequence: u64,
}

fn new_uid() -> String {
    let mut uid = Uuid::new_v4().simple().to_string();
    uid.truncate(28);
    uid
}

fn validate_email(email: &str) -> Result<(), BackendError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(BackendError::auth(
            "invalid-email",
            format!("'{email}' is not a valid email address"),
        )),
    }
}

fn validate_password(password: &Password) -> Result<(), BackendError> {
    if password.expose().chars().count() < MIN_PASSWORD_LEN {
        return Err(BackendError::auth(
            "weak-password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn blank_user(uid: String) -> User {
    User {
        uid,
        email: None,
        email_verified: false,
        display_name: None,
        photo_url: None,
        phone_number: None,
        is_anonymous: false,
        provider_ids: Vec::new(),
    }
}

fn user_not_found() -> BackendError {
    BackendError::auth("user-not-found", "no user record corresponds to this identifier")
}

impl Accounts {
    pub(crate) fn current_user(&self) -> Option<User> {
        let uid = self.current.as_ref()?;
        self.by_uid.get(uid).map(|a| a.user.clone())
    }

    pub(crate) fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub(crate) fn set_persistence(&mut self, persistence: Persistence) {
        self.persistence = persistence;
    }

    fn next_token(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }

    fn uid_for_email(&self, email: &str) -> Option<&str> {
        self.by_uid
            .iter()
            .find(|(_, a)| a.user.email.as_deref() == Some(email))
            .map(|(uid, _)| uid.as_str())
    }

    fn account_mut(&mut self, user: &UserHandle) -> Result<&mut Account, BackendError> {
        self.by_uid.get_mut(&user.uid).ok_or_else(user_not_found)
    }

    fn sign_in(&mut self, uid: &str, provider_id: Option<&str>, is_new_user: bool) -> UserCredential {
        self.current = Some(uid.to_owned());
        let user = self
            .by_uid
            .get(uid)
            .map_or_else(|| blank_user(uid.to_owned()), |a| a.user.clone());
        UserCredential {
            user,
            provider_id: provider_id.map(str::to_owned),
            is_new_user,
        }
    }

    /// Sign in through a `(provider, subject)` link, creating the account
    /// on first use.
    fn sign_in_linked(&mut self, provider_id: &str, subject: &str) -> UserCredential {
        let key = (provider_id.to_owned(), subject.to_owned());
        if let Some(uid) = self.links.get(&key).cloned() {
            return self.sign_in(&uid, Some(provider_id), false);
        }
        let uid = if provider_id == CUSTOM_PROVIDER {
            subject.to_owned()
        } else {
            new_uid()
        };
        let mut user = blank_user(uid.clone());
        if provider_id != CUSTOM_PROVIDER {
            user.provider_ids.push(provider_id.to_owned());
        }
        if provider_id == PHONE_PROVIDER {
            user.phone_number = Some(subject.to_owned());
        }
        self.by_uid.insert(
            uid.clone(),
            Account {
                user,
                password: None,
            },
        );
        self.links.insert(key, uid.clone());
        self.sign_in(&uid, Some(provider_id), true)
    }

    // ── Email / password ─────────────────────────────────────────────

    pub(crate) fn create_user(
        &mut self,
        email: &str,
        password: &Password,
    ) -> Result<UserCredential, BackendError> {
        validate_email(email)?;
        validate_password(password)?;
        if self.uid_for_email(email).is_some() {
            return Err(BackendError::auth(
                "email-already-in-use",
                format!("'{email}' is already in use by another account"),
            ));
        }
        let uid = new_uid();
        let mut user = blank_user(uid.clone());
        user.email = Some(email.to_owned());
        user.provider_ids.push(PASSWORD_PROVIDER.into());
        self.by_uid.insert(
            uid.clone(),
            Account {
                user,
                password: Some(password.expose().to_owned()),
            },
        );
        Ok(self.sign_in(&uid, Some(PASSWORD_PROVIDER), true))
    }

    pub(crate) fn sign_in_with_password(
        &mut self,
        email: &str,
        password: &Password,
    ) -> Result<UserCredential, BackendError> {
        validate_email(email)?;
        let uid = self.uid_for_email(email).ok_or_else(user_not_found)?.to_owned();
        let matches = self
            .by_uid
            .get(&uid)
            .and_then(|a| a.password.as_deref())
            .is_some_and(|stored| stored == password.expose());
        if !matches {
            return Err(BackendError::auth(
                "wrong-password",
                "the password is invalid or the user does not have a password",
            ));
        }
        Ok(self.sign_in(&uid, Some(PASSWORD_PROVIDER), false))
    }

    pub(crate) fn sign_in_anonymously(&mut self) -> UserCredential {
        let uid = new_uid();
        let mut user = blank_user(uid.clone());
        user.is_anonymous = true;
        self.by_uid.insert(
            uid.clone(),
            Account {
                user,
                password: None,
            },
        );
        self.sign_in(&uid, None, true)
    }

    pub(crate) fn sign_in_with_custom_token(
        &mut self,
        token: &str,
    ) -> Result<UserCredential, BackendError> {
        if token.trim().is_empty() {
            return Err(BackendError::auth(
                "invalid-custom-token",
                "the custom token format is incorrect",
            ));
        }
        Ok(self.sign_in_linked(CUSTOM_PROVIDER, token))
    }

    pub(crate) fn sign_in_with_credential(
        &mut self,
        credential: &Credential,
    ) -> Result<UserCredential, BackendError> {
        if credential.provider_id == PHONE_PROVIDER {
            let phone_number = self.redeem_verification(credential)?;
            return Ok(self.sign_in_linked(PHONE_PROVIDER, &phone_number));
        }
        let token = credential
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                BackendError::auth("invalid-credential", "the supplied credential has no token")
            })?;
        Ok(self.sign_in_linked(&credential.provider_id, token))
    }

    pub(crate) fn sign_out(&mut self) {
        self.current = None;
    }

    // ── Phone verification ───────────────────────────────────────────

    pub(crate) fn start_phone_verification(
        &mut self,
        phone_number: &str,
        verifier: &str,
    ) -> Result<String, BackendError> {
        if verifier.is_empty() {
            return Err(BackendError::auth(
                "missing-app-credential",
                "an application verifier is required for phone sign-in",
            ));
        }
        let digits = phone_number.strip_prefix('+').unwrap_or_default();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(BackendError::auth(
                "invalid-phone-number",
                format!("'{phone_number}' is not in E.164 format"),
            ));
        }
        let verification_id = self.next_token("verification");
        let code = format!("{:06}", self.sequence % 1_000_000);
        self.verifications.insert(
            verification_id.clone(),
            PhoneVerification {
                phone_number: phone_number.to_owned(),
                code,
            },
        );
        Ok(verification_id)
    }

    pub(crate) fn verification_code(&self, verification_id: &str) -> Option<String> {
        self.verifications.get(verification_id).map(|v| v.code.clone())
    }

    fn redeem_verification(&mut self, credential: &Credential) -> Result<String, BackendError> {
        let id = credential.verification_id.as_deref().unwrap_or_default();
        let pending = self.verifications.get(id).ok_or_else(|| {
            BackendError::auth("invalid-verification-id", "unknown verification id")
        })?;
        if credential.verification_code.as_deref() != Some(pending.code.as_str()) {
            return Err(BackendError::auth(
                "invalid-verification-code",
                "the SMS verification code is invalid",
            ));
        }
        let phone_number = pending.phone_number.clone();
        self.verifications.remove(id);
        Ok(phone_number)
    }

    // ── Action codes ─────────────────────────────────────────────────

    pub(crate) fn issue_code(
        &mut self,
        email: &str,
        operation: ActionCodeOperation,
    ) -> Result<String, BackendError> {
        validate_email(email)?;
        if self.uid_for_email(email).is_none() {
            return Err(user_not_found());
        }
        let code = self.next_token("oob");
        self.codes.insert(
            code.clone(),
            IssuedCode {
                operation,
                email: email.to_owned(),
            },
        );
        Ok(code)
    }

    pub(crate) fn codes_for(&self, email: &str) -> Vec<String> {
        let mut codes: Vec<String> = self
            .codes
            .iter()
            .filter(|(_, c)| c.email == email)
            .map(|(code, _)| code.clone())
            .collect();
        codes.sort();
        codes
    }

    fn code(&self, code: &str) -> Result<&IssuedCode, BackendError> {
        self.codes.get(code).ok_or_else(|| {
            BackendError::auth(
                "invalid-action-code",
                "the action code is invalid, expired, or has already been used",
            )
        })
    }

    pub(crate) fn check_code(&self, code: &str) -> Result<ActionCodeInfo, BackendError> {
        let issued = self.code(code)?;
        Ok(ActionCodeInfo {
            operation: issued.operation,
            email: issued.email.clone(),
        })
    }

    pub(crate) fn apply_code(&mut self, code: &str) -> Result<(), BackendError> {
        let issued = self.code(code)?;
        if issued.operation != ActionCodeOperation::VerifyEmail {
            return Err(BackendError::auth(
                "invalid-action-code",
                "password reset codes must be confirmed with a new password",
            ));
        }
        let email = issued.email.clone();
        self.codes.remove(code);
        if let Some(uid) = self.uid_for_email(&email).map(str::to_owned) {
            if let Some(account) = self.by_uid.get_mut(&uid) {
                account.user.email_verified = true;
            }
        }
        Ok(())
    }

    pub(crate) fn verify_reset_code(&self, code: &str) -> Result<String, BackendError> {
        let issued = self.code(code)?;
        if issued.operation != ActionCodeOperation::PasswordReset {
            return Err(BackendError::auth(
                "invalid-action-code",
                "the action code is not a password reset code",
            ));
        }
        Ok(issued.email.clone())
    }

    pub(crate) fn confirm_reset(
        &mut self,
        code: &str,
        new_password: &Password,
    ) -> Result<(), BackendError> {
        let email = self.verify_reset_code(code)?;
        validate_password(new_password)?;
        let uid = self.uid_for_email(&email).ok_or_else(user_not_found)?.to_owned();
        self.codes.remove(code);
        if let Some(account) = self.by_uid.get_mut(&uid) {
            account.password = Some(new_password.expose().to_owned());
        }
        Ok(())
    }

    pub(crate) fn providers_for_email(&self, email: &str) -> Result<Vec<String>, BackendError> {
        validate_email(email)?;
        Ok(self
            .uid_for_email(email)
            .and_then(|uid| self.by_uid.get(uid))
            .map(|a| a.user.provider_ids.clone())
            .unwrap_or_default())
    }

    // ── Principal updates ────────────────────────────────────────────

    pub(crate) fn unlink(
        &mut self,
        user: &UserHandle,
        provider_id: &str,
    ) -> Result<User, BackendError> {
        let account = self.account_mut(user)?;
        let before = account.user.provider_ids.len();
        account.user.provider_ids.retain(|p| p != provider_id);
        if account.user.provider_ids.len() == before {
            return Err(BackendError::auth(
                "no-such-provider",
                format!("user is not linked to provider '{provider_id}'"),
            ));
        }
        if provider_id == PASSWORD_PROVIDER {
            account.password = None;
        }
        if provider_id == PHONE_PROVIDER {
            account.user.phone_number = None;
        }
        let unlinked = account.user.clone();
        self.links
            .retain(|(provider, _), uid| !(provider == provider_id && *uid == user.uid));
        Ok(unlinked)
    }

    pub(crate) fn update_email(&mut self, user: &UserHandle, email: &str) -> Result<(), BackendError> {
        validate_email(email)?;
        if self.uid_for_email(email).is_some_and(|uid| uid != user.uid) {
            return Err(BackendError::auth(
                "email-already-in-use",
                format!("'{email}' is already in use by another account"),
            ));
        }
        let account = self.account_mut(user)?;
        account.user.email = Some(email.to_owned());
        account.user.email_verified = false;
        Ok(())
    }

    pub(crate) fn update_password(
        &mut self,
        user: &UserHandle,
        new_password: &Password,
    ) -> Result<(), BackendError> {
        validate_password(new_password)?;
        let account = self.account_mut(user)?;
        account.password = Some(new_password.expose().to_owned());
        if !account.user.provider_ids.iter().any(|p| p == PASSWORD_PROVIDER) {
            account.user.provider_ids.push(PASSWORD_PROVIDER.into());
        }
        Ok(())
    }

    pub(crate) fn update_phone_number(
        &mut self,
        user: &UserHandle,
        credential: &Credential,
    ) -> Result<(), BackendError> {
        self.account_mut(user)?;
        let phone_number = self.redeem_verification(credential)?;
        let account = self.account_mut(user)?;
        account.user.phone_number = Some(phone_number.clone());
        if !account.user.provider_ids.iter().any(|p| p == PHONE_PROVIDER) {
            account.user.provider_ids.push(PHONE_PROVIDER.into());
        }
        self.links
            .insert((PHONE_PROVIDER.into(), phone_number), user.uid.clone());
        Ok(())
    }

    pub(crate) fn update_profile(
        &mut self,
        user: &UserHandle,
        profile: &ProfileUpdate,
    ) -> Result<(), BackendError> {
        let account = self.account_mut(user)?;
        if let Some(name) = &profile.display_name {
            account.user.display_name = Some(name.clone());
        }
        if let Some(url) = &profile.photo_url {
            account.user.photo_url = Some(url.clone());
        }
        Ok(())
    }
}
