//! Credentials and the APRS-IS login line.
//!
//! The login line has the form
//!
//! ```text
//! user <CALLSIGN> pass <PASSCODE> vers <CLIENT> <VERSION>[ filter <FILTER>]
//! ```
//!
//! The callsign is normalised once at construction: it is cut or padded to
//! [`CALLSIGN_LENGTH`] characters, trailing whitespace is removed, and the
//! result is upper-cased.

use std::fmt;

use thiserror::Error;

/// Width the callsign is padded or truncated to before trimming.
pub const CALLSIGN_LENGTH: usize = 8;

/// Error returned for unusable login credentials.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("callsign must not be empty")]
    EmptyCallsign,
    #[error("passcode must not be empty")]
    EmptyPasscode,
}

/// Callsign and passcode used to log in to APRS-IS.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    callsign: String,
    passcode: String,
}

impl Credentials {
    /// Validates and normalises the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] if the callsign is blank after
    /// normalisation or the passcode is empty.  The passcode is otherwise
    /// used exactly as given.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use aprs_core::Credentials;
    ///
    /// let creds = Credentials::new("g4klx-10", "12345").unwrap();
    /// assert_eq!(creds.callsign(), "G4KLX-10");
    /// ```
    pub fn new(callsign: &str, passcode: &str) -> Result<Self, CredentialsError> {
        let callsign = normalise_callsign(callsign);
        if callsign.is_empty() {
            return Err(CredentialsError::EmptyCallsign);
        }
        if passcode.is_empty() {
            return Err(CredentialsError::EmptyPasscode);
        }
        Ok(Self {
            callsign,
            passcode: passcode.to_string(),
        })
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    pub fn passcode(&self) -> &str {
        &self.passcode
    }
}

// The passcode stays out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("callsign", &self.callsign)
            .field("passcode", &"<redacted>")
            .finish()
    }
}

/// Everything needed to compose the login line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub credentials: Credentials,
    /// Software name announced after `vers`.
    pub client_name: String,
    /// Software version announced after the client name.
    pub version: String,
    /// Optional server-side filter, e.g. `r/51.5/-0.1/50`.
    pub filter: Option<String>,
}

impl LoginRequest {
    /// Renders the login line without a terminator.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} pass {} vers {} {}",
            self.credentials.callsign, self.credentials.passcode, self.client_name, self.version
        )?;
        if let Some(filter) = self.filter.as_deref().filter(|s| !s.trim().is_empty()) {
            write!(f, " filter {}", filter.trim())?;
        }
        Ok(())
    }
}

fn normalise_callsign(raw: &str) -> String {
    let fixed: String = raw
        .chars()
        .chain(std::iter::repeat(' '))
        .take(CALLSIGN_LENGTH)
        .collect();
    fixed.trim_end().to_uppercase()
}
