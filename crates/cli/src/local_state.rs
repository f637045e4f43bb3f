use std::{fs, path::Path};

use api_types::auth::AuthSession;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What survives between runs: the last signed-in session.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LocalState {
    #[serde(default)]
    pub session: Option<AuthSession>,
}

impl LocalState {
    pub fn load(path: &str) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use api_types::auth::{User, UserId};

    use super::*;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("gastos-{}-{name}", std::process::id()))
            .join("state.json")
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn missing_file_is_signed_out() {
        let state = LocalState::load(&temp_path("missing")).unwrap();
        assert_eq!(state.session, None);
    }

    #[test]
    fn session_survives_a_save() {
        let path = temp_path("saved");
        let state = LocalState {
            session: Some(AuthSession {
                access_token: "token".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: None,
                user: User {
                    id: UserId::from("u1"),
                    email: Some("u1@example.com".to_string()),
                },
            }),
        };
        state.save(&path).unwrap();
        assert_eq!(LocalState::load(&path).unwrap(), state);

        LocalState::default().save(&path).unwrap();
        assert_eq!(LocalState::load(&path).unwrap().session, None);
        let _ = fs::remove_file(&path);
    }
}
