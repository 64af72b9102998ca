use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Seat a person occupies in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameRole {
    Viewer,
    Player,
    Showman,
}

impl GameRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameRole::Viewer => "viewer",
            GameRole::Player => "player",
            GameRole::Showman => "showman",
        }
    }
}

impl Display for GameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(GameRole::Viewer),
            "player" => Ok(GameRole::Player),
            "showman" => Ok(GameRole::Showman),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("m"),
            Sex::Female => f.write_str("f"),
        }
    }
}

impl FromStr for Sex {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "m" | "male" => Ok(Sex::Male),
            "f" | "female" => Ok(Sex::Female),
            _ => Err(()),
        }
    }
}

/// Join handshake sent by a candidate before any client exists for it
///
/// The role travels as text so that an unknown role can be rejected with a
/// typed error instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub role: String,
    pub sex: Sex,
    pub password: Option<String>,
}

impl JoinRequest {
    pub fn new(name: impl Into<String>, role: GameRole, sex: Sex) -> Self {
        Self {
            name: name.into(),
            role: role.to_string(),
            sex,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("Player".parse::<GameRole>(), Ok(GameRole::Player));
        assert_eq!("showman".parse::<GameRole>(), Ok(GameRole::Showman));
        assert!("referee".parse::<GameRole>().is_err());
    }

    #[test]
    fn test_join_request_builder() {
        let request = JoinRequest::new("alice", GameRole::Showman, Sex::Female).with_password("secret");
        assert_eq!(request.role, "showman");
        assert_eq!(request.password.as_deref(), Some("secret"));
    }
}
