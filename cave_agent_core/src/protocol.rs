//! Newline-delimited JSON messages exchanged with the game server.
//!
//! Every message is a single JSON object on its own line, tagged by a
//! `"type"` field.

use serde::{Deserialize, Serialize};

use crate::{
    Direction, Player,
    map::Cave,
    snapshot::{ItemLocation, PlayerLocation},
};

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Authorize { token: String },
    Command { direction: Direction },
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Response {
    Authorized {
        human_player: Player,
    },
    Unauthorized {
        #[serde(default)]
        reason: Option<String>,
    },
    StateCave {
        cave: Cave,
    },
    StateLocations {
        item_locations: Vec<ItemLocation>,
        player_locations: Vec<PlayerLocation>,
    },
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Authorized { .. } => "Authorized",
            Response::Unauthorized { .. } => "Unauthorized",
            Response::StateCave { .. } => "StateCave",
            Response::StateLocations { .. } => "StateLocations",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message {line:?}: {source}")]
    Malformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {request:?}: {source}")]
    Encode {
        request: Request,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes one inbound line (without its terminator).
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    serde_json::from_str(line).map_err(|source| ProtocolError::Malformed {
        line: line.to_string(),
        source,
    })
}

/// Encodes one outbound message as a single line, without the terminator.
pub fn encode_request(request: &Request) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|source| ProtocolError::Encode {
        request: request.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Item, Location};

    #[test]
    fn requests_encode_to_tagged_lines() {
        assert_eq!(
            encode_request(&Request::Authorize {
                token: "1670".to_string()
            })
            .unwrap(),
            r#"{"type":"Authorize","token":"1670"}"#
        );
        assert_eq!(
            encode_request(&Request::Command {
                direction: Direction::Left
            })
            .unwrap(),
            r#"{"type":"Command","direction":"Left"}"#
        );
    }

    #[test]
    fn decodes_authorization_outcomes() {
        assert_eq!(
            decode_response(
                r#"{"type":"Authorized","humanPlayer":{"type":"HumanPlayer","name":"ada"}}"#
            )
            .unwrap(),
            Response::Authorized {
                human_player: Player::human("ada")
            }
        );
        assert_eq!(
            decode_response(r#"{"type":"Unauthorized","reason":"bad token"}"#).unwrap(),
            Response::Unauthorized {
                reason: Some("bad token".to_string())
            }
        );
        assert_eq!(
            decode_response(r#"{"type":"Unauthorized"}"#).unwrap(),
            Response::Unauthorized { reason: None }
        );
    }

    #[test]
    fn decodes_cave_and_locations() {
        let cave = decode_response(
            r#"{"type":"StateCave","cave":{"rows":1,"columns":3,"rocks":[false,true,false]}}"#,
        )
        .unwrap();
        let Response::StateCave { cave } = cave else {
            panic!("expected StateCave, got {cave:?}");
        };
        assert!(cave.is_rock(Location::new(0, 1)));

        let locations = decode_response(
            r#"{"type":"StateLocations",
                "itemLocations":[
                    {"entity":{"type":"Gold","id":1,"value":50},"location":{"row":0,"column":2}},
                    {"entity":{"type":"Health","id":2},"location":{"row":0,"column":0}}
                ],
                "playerLocations":[
                    {"entity":{"type":"HumanPlayer","name":"ada"},"location":{"row":0,"column":0}},
                    {"entity":{"type":"Dragon"},"location":{"row":0,"column":2}}
                ]}"#,
        )
        .unwrap();
        assert_eq!(
            locations,
            Response::StateLocations {
                item_locations: vec![
                    ItemLocation {
                        entity: Item::Gold { id: 1, value: 50 },
                        location: Location::new(0, 2),
                    },
                    ItemLocation {
                        entity: Item::Health { id: 2, value: 0 },
                        location: Location::new(0, 0),
                    },
                ],
                player_locations: vec![
                    PlayerLocation {
                        entity: Player::human("ada"),
                        location: Location::new(0, 0),
                    },
                    PlayerLocation {
                        entity: Player::Dragon { id: 0 },
                        location: Location::new(0, 2),
                    },
                ],
            }
        );
    }

    #[test]
    fn rejects_unknown_and_broken_messages() {
        assert!(matches!(
            decode_response(r#"{"type":"Teleport"}"#),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            decode_response("{not json"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            decode_response(r#"{"type":"StateCave","cave":{"rows":2,"columns":2,"rocks":[]}}"#),
            Err(ProtocolError::Malformed { .. })
        ));
    }
}
