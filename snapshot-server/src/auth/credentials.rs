//! Basic-auth credentials for the two caller classes.
//!
//! The ordinary and control identities have independent secrets. Knowing
//! one never authenticates as the other.

use super::AuthError;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialClass {
    /// Regular API user: source listing, snapshots, policies.
    Ordinary,
    /// Administrative identity: refresh, shutdown, status.
    Control,
}

#[derive(Clone)]
pub struct Credential {
    pub username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    ordinary: Credential,
    control: Credential,
}

impl Authenticator {
    pub fn new(ordinary: Credential, control: Credential) -> anyhow::Result<Self> {
        if ordinary.username == control.username {
            anyhow::bail!(
                "server username and server control username must differ (both are {:?})",
                ordinary.username
            );
        }
        if ordinary.password.is_empty() || control.password.is_empty() {
            anyhow::bail!("server passwords must not be empty");
        }
        Ok(Self { ordinary, control })
    }

    /// Resolve the class of a username/password pair.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<CredentialClass, AuthError> {
        // Both comparisons always run
        let ordinary = self.ordinary.matches(username, password);
        let control = self.control.matches(username, password);
        match (ordinary, control) {
            (true, _) => Ok(CredentialClass::Ordinary),
            (false, true) => Ok(CredentialClass::Control),
            (false, false) => Err(AuthError::InvalidCredentials),
        }
    }

    /// Authenticate a raw `Authorization` header value.
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<(CredentialClass, String), AuthError> {
        let header = header.ok_or(AuthError::MissingCredentials)?;
        let (username, password) = parse_basic(header).ok_or(AuthError::MalformedCredentials)?;
        let class = self.authenticate(&username, &password)?;
        Ok((class, username))
    }
}

/// Decode `Basic base64(user:pass)`.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

pub fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            Credential::new("kopia", "user-secret"),
            Credential::new("server-control", "control-secret"),
        )
        .unwrap()
    }

    fn basic(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    #[test]
    fn test_classes_are_resolved_independently() {
        let auth = authenticator();
        assert_eq!(auth.authenticate("kopia", "user-secret").unwrap(), CredentialClass::Ordinary);
        assert_eq!(
            auth.authenticate("server-control", "control-secret").unwrap(),
            CredentialClass::Control
        );
    }

    #[test]
    fn test_secrets_do_not_cross_classes() {
        let auth = authenticator();
        assert!(auth.authenticate("kopia", "control-secret").is_err());
        assert!(auth.authenticate("server-control", "user-secret").is_err());
        assert!(auth.authenticate("kopia", "").is_err());
    }

    #[test]
    fn test_same_username_rejected() {
        let result = Authenticator::new(Credential::new("a", "x"), Credential::new("a", "y"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_basic_header() {
        assert_eq!(
            parse_basic(&basic("kopia", "pa:ss")),
            Some(("kopia".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[test]
    fn test_authenticate_header() {
        let auth = authenticator();
        let (class, user) = auth
            .authenticate_header(Some(&basic("server-control", "control-secret")))
            .unwrap();
        assert_eq!(class, CredentialClass::Control);
        assert_eq!(user, "server-control");

        assert!(matches!(auth.authenticate_header(None), Err(AuthError::MissingCredentials)));
        assert!(matches!(
            auth.authenticate_header(Some("Basic")),
            Err(AuthError::MalformedCredentials)
        ));
    }

    #[test]
    fn test_random_passwords_differ() {
        let a = random_password();
        assert_eq!(a.len(), 32);
        assert_ne!(a, random_password());
    }
}
