//! API credentials.
//!
//! Credentials files are INI-style:
//!
//! ```text
//! [api_keys]
//! user = jane
//! password = secret
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::LabError;

const SECTION: &str = "api_keys";

/// A user name and password for the remote lab.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Read the `[api_keys]` section of the file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, LabError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LabError::Credentials(format!(
                    "No credentials file found at \"{}\"",
                    path.display()
                ))
            } else {
                LabError::Io(source)
            }
        })?;
        Self::from_ini_str(&contents).map_err(|message| {
            LabError::Credentials(format!("{} in \"{}\"", message, path.display()))
        })
    }

    fn from_ini_str(contents: &str) -> Result<Self, String> {
        let mut saw_section = false;
        let mut in_section = false;
        let mut user = None;
        let mut password = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = name.trim() == SECTION;
                saw_section |= in_section;
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                continue;
            };
            match key.trim() {
                "user" => user = Some(value.trim().to_string()),
                "password" => password = Some(value.trim().to_string()),
                _ => {}
            }
        }

        if !saw_section {
            return Err(format!("missing [{SECTION}] section"));
        }
        match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() => Ok(Self { user, password }),
            (Some(user), None) if !user.is_empty() => Err("missing 'password' key".to_string()),
            _ => Err("missing 'user' key".to_string()),
        }
    }

    /// Explicit credentials win over a credentials file; one of them is required.
    pub fn resolve(explicit: Option<Credentials>, file: Option<&Path>) -> Result<Self, LabError> {
        match (explicit, file) {
            (Some(credentials), _) => Ok(credentials),
            (None, Some(path)) => Self::from_file(path),
            (None, None) => Err(LabError::Credentials(
                "Either credentials_file or credentials must be provided".to_string(),
            )),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `Authorization` header value for HTTP Basic authentication.
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

/// Fuzz-only entrypoint for credentials file parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_credentials(input: &str) -> Result<(), LabError> {
    Credentials::from_ini_str(input)
        .map(|_| ())
        .map_err(LabError::Credentials)
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
