//! The per-message decision loop.
//!
//! [`step`] is the pure state machine: it takes the session state and one
//! inbound message and returns the next state plus at most one command.
//! [`run_session`] drives it over a blocking line reader and writer.

use std::io::{BufRead, Write};

use tracing::{debug, error, info};

use crate::{
    Location, Player,
    agent::{Agent, Decision},
    map::{Cave, GridError},
    protocol::{ProtocolError, Request, Response, decode_response, encode_request},
    snapshot::{ViewError, WorldSnapshot, WorldView},
};

/// Where the session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Nothing sent yet.
    #[default]
    Connecting,
    /// Authorization sent; identity or cave layout still missing.
    Authorizing,
    /// Cave layout known, no usable location snapshot yet.
    Idle,
    /// Identity, cave and locations known; snapshots trigger moves.
    Ready,
    /// Terminal.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub token: String,
}

/// Inbound traffic that breaks the protocol's guarantees.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error(transparent)]
    Codec(#[from] ProtocolError),
    #[error("snapshot refers to a cell outside the cave: {0}")]
    OutsideCave(#[from] GridError),
    #[error("cave resized from {old_rows}x{old_columns} to {rows}x{columns}")]
    CaveResized {
        old_rows: usize,
        old_columns: usize,
        rows: usize,
        columns: usize,
    },
    #[error("identity changed from {old:?} to {new:?}")]
    IdentityChanged { old: Player, new: Player },
}

/// Conditions that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("authorization rejected: {}", reason.as_deref().unwrap_or("no reason given"))]
    AuthorizationRejected { reason: Option<String> },
    #[error("{player:?} is missing from the location snapshot")]
    SelfLocationMissing { player: Player },
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        SessionError::Protocol(err.into())
    }
}

/// Everything the loop carries from one message to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    phase: Phase,
    me: Option<Player>,
    cave: Option<Cave>,
    snapshot: Option<WorldSnapshot>,
    ticks: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn me(&self) -> Option<&Player> {
        self.me.as_ref()
    }

    pub fn cave(&self) -> Option<&Cave> {
        self.cave.as_ref()
    }

    pub fn snapshot(&self) -> Option<&WorldSnapshot> {
        self.snapshot.as_ref()
    }

    /// Number of decide-and-act cycles run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sends the authorization request and starts waiting for the server.
    pub fn start(mut self, config: &SessionConfig) -> (SessionState, Request) {
        self.phase = Phase::Authorizing;
        let request = Request::Authorize {
            token: config.token.clone(),
        };
        (self, request)
    }

    pub fn close(mut self) -> SessionState {
        self.phase = Phase::Closed;
        self
    }

    fn settle(&mut self) {
        let previous = self.phase;
        self.phase = match (&self.me, &self.cave, &self.snapshot) {
            (Some(_), Some(_), Some(_)) => Phase::Ready,
            (_, Some(_), _) => Phase::Idle,
            _ => Phase::Authorizing,
        };
        if previous != self.phase {
            info!(from = ?previous, to = ?self.phase, "session phase changed");
        }
    }
}

/// One decide-and-act cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub location: Location,
    pub decision: Decision,
}

/// Result of feeding one message to [`step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub command: Option<Request>,
    pub report: Option<TickReport>,
}

impl Transition {
    fn quiet(state: SessionState) -> Self {
        Transition {
            state,
            command: None,
            report: None,
        }
    }
}

/// Applies one inbound message to the session.
///
/// Only a location snapshot received while [`Phase::Ready`] produces a
/// command, and never more than one.
pub fn step(
    mut state: SessionState,
    response: Response,
    agent: &mut dyn Agent,
) -> Result<Transition, SessionError> {
    if state.phase == Phase::Closed {
        debug!(kind = response.kind(), "session closed, ignoring message");
        return Ok(Transition::quiet(state));
    }

    match response {
        Response::Authorized { human_player } => {
            if let Some(old) = state.me.as_ref().filter(|old| **old != human_player) {
                return Err(ProtocolViolation::IdentityChanged {
                    old: old.clone(),
                    new: human_player,
                }
                .into());
            }
            info!(player = ?human_player, "authorized");
            state.me = Some(human_player);
            state.settle();
            Ok(Transition::quiet(state))
        }
        Response::Unauthorized { reason } => {
            error!(?reason, "unauthorized");
            Err(SessionError::AuthorizationRejected { reason })
        }
        Response::StateCave { cave } => {
            if let Some(old) = &state.cave {
                if (old.rows(), old.columns()) != (cave.rows(), cave.columns()) {
                    return Err(ProtocolViolation::CaveResized {
                        old_rows: old.rows(),
                        old_columns: old.columns(),
                        rows: cave.rows(),
                        columns: cave.columns(),
                    }
                    .into());
                }
            }
            info!(rows = cave.rows(), columns = cave.columns(), "cave layout received");
            state.cave = Some(cave);
            state.settle();
            Ok(Transition::quiet(state))
        }
        Response::StateLocations {
            item_locations,
            player_locations,
        } => {
            debug!(
                items = item_locations.len(),
                players = player_locations.len(),
                "locations received"
            );
            state.snapshot = Some(WorldSnapshot::new(item_locations, player_locations));
            state.settle();

            let Some(report) = act(&state, agent)? else {
                return Ok(Transition::quiet(state));
            };
            state.ticks = report.tick;

            let command = report
                .decision
                .command
                .map(|direction| Request::Command { direction });
            Ok(Transition {
                state,
                command,
                report: Some(report),
            })
        }
    }
}

/// Runs one decide cycle if the session is ready for it.
fn act(state: &SessionState, agent: &mut dyn Agent) -> Result<Option<TickReport>, SessionError> {
    let (Phase::Ready, Some(me), Some(cave), Some(snapshot)) =
        (state.phase, &state.me, &state.cave, &state.snapshot)
    else {
        return Ok(None);
    };

    let view = WorldView::new(cave, snapshot, me).map_err(|err| match err {
        ViewError::SelfMissing { player } => SessionError::SelfLocationMissing { player },
        ViewError::OutOfBounds(err) => ProtocolViolation::from(err).into(),
    })?;

    Ok(Some(TickReport {
        tick: state.ticks + 1,
        location: view.location,
        decision: agent.decide(&view),
    }))
}

/// Hooks into the running loop.
pub trait SessionObserver {
    /// Called after each decide-and-act cycle, once its command is sent.
    fn on_tick(&mut self, _state: &SessionState, _report: &TickReport) {}

    /// Checked before blocking on the next message; `true` ends the session.
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Observer that does nothing.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// How a session that ended without error went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub state: SessionState,
    pub commands_sent: u64,
    /// The observer asked to stop before the server closed the stream.
    pub stopped: bool,
}

/// Runs a session over a connected line stream until the server closes it,
/// the observer asks to stop, or a fatal error occurs.
pub fn run_session<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    config: &SessionConfig,
    agent: &mut dyn Agent,
    observer: &mut dyn SessionObserver,
) -> Result<SessionSummary, SessionError> {
    info!(agent = agent.name(), "starting session");
    let (mut state, hello) = SessionState::new().start(config);
    send(&mut writer, &hello)?;

    let mut commands_sent = 0;
    let mut stopped = false;
    let mut line = String::new();

    loop {
        if observer.should_stop() {
            info!("stop requested");
            stopped = true;
            break;
        }

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            info!("server closed the stream");
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let transition = match decode_response(message) {
            Ok(response) => step(state, response, agent),
            Err(err) => Err(err.into()),
        }
        .inspect_err(|err| error!(%err, "session failed"))?;
        state = transition.state;

        if let Some(command) = &transition.command {
            send(&mut writer, command)?;
            commands_sent += 1;
        }
        if let Some(report) = &transition.report {
            observer.on_tick(&state, report);
        }
    }

    info!(ticks = state.ticks(), commands_sent, "client exiting");
    Ok(SessionSummary {
        state: state.close(),
        commands_sent,
        stopped,
    })
}

fn send<W: Write>(writer: &mut W, request: &Request) -> Result<(), SessionError> {
    let line = encode_request(request)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!(%line, "sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Direction,
        agent::{DecisionKind, PlanningAgent},
        scenario::{Scenario, parse_scenario},
    };

    fn scenario(map: &str) -> Scenario {
        parse_scenario(map).expect("valid scenario map")
    }

    fn cave_of(world: &Scenario) -> Response {
        Response::StateCave {
            cave: world.cave.clone(),
        }
    }

    fn locations_of(world: &Scenario) -> Response {
        Response::StateLocations {
            item_locations: world.snapshot.items.clone(),
            player_locations: world.snapshot.players.clone(),
        }
    }

    fn authorized(world: &Scenario) -> Response {
        Response::Authorized {
            human_player: world.me.clone(),
        }
    }

    fn started() -> SessionState {
        let config = SessionConfig {
            token: "secret".to_string(),
        };
        SessionState::new().start(&config).0
    }

    fn feed(
        state: SessionState,
        messages: Vec<Response>,
        agent: &mut dyn Agent,
    ) -> Result<Transition, SessionError> {
        let mut transition = Transition::quiet(state);
        for message in messages {
            transition = step(transition.state, message, agent)?;
        }
        Ok(transition)
    }

    const OPEN: &str = "
        @.G
        ...
        ...
    ";

    #[test]
    fn start_sends_authorize() {
        let config = SessionConfig {
            token: "1670".to_string(),
        };
        let (state, request) = SessionState::new().start(&config);
        assert_eq!(state.phase(), Phase::Authorizing);
        assert_eq!(
            request,
            Request::Authorize {
                token: "1670".to_string()
            }
        );
    }

    #[test]
    fn walks_phases_and_moves_on_snapshot() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);

        let transition = feed(started(), vec![authorized(&world)], &mut agent).unwrap();
        assert_eq!(transition.state.phase(), Phase::Authorizing);

        let transition = step(transition.state, cave_of(&world), &mut agent).unwrap();
        assert_eq!(transition.state.phase(), Phase::Idle);
        assert_eq!(transition.command, None);

        let transition = step(transition.state, locations_of(&world), &mut agent).unwrap();
        assert_eq!(transition.state.phase(), Phase::Ready);
        assert_eq!(
            transition.command,
            Some(Request::Command {
                direction: Direction::Right
            })
        );
        let report = transition.report.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.location, Location::new(0, 0));
        assert_eq!(report.decision.kind, DecisionKind::Planned);
        assert_eq!(transition.state.ticks(), 1);
    }

    #[test]
    fn snapshot_before_cave_waits_without_moving() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);

        let transition = feed(
            started(),
            vec![authorized(&world), locations_of(&world)],
            &mut agent,
        )
        .unwrap();
        assert_eq!(transition.state.phase(), Phase::Authorizing);
        assert_eq!(transition.command, None);

        let transition = step(transition.state, cave_of(&world), &mut agent).unwrap();
        assert_eq!(transition.state.phase(), Phase::Ready);
        assert_eq!(transition.command, None);
        assert_eq!(transition.report, None);
    }

    #[test]
    fn no_target_sends_nothing() {
        let world = scenario(
            "
            ...
            .@.
            ...
            ",
        );
        let mut agent = PlanningAgent::seeded(0);
        let transition = feed(
            started(),
            vec![authorized(&world), cave_of(&world), locations_of(&world)],
            &mut agent,
        )
        .unwrap();
        assert_eq!(transition.command, None);
        assert_eq!(
            transition.report.map(|report| report.decision.kind),
            Some(DecisionKind::NoTarget)
        );
    }

    #[test]
    fn unauthorized_is_fatal() {
        let mut agent = PlanningAgent::seeded(0);
        let err = step(
            started(),
            Response::Unauthorized {
                reason: Some("bad token".to_string()),
            },
            &mut agent,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::AuthorizationRejected { reason: Some(ref r) } if r == "bad token"
        ));
    }

    #[test]
    fn missing_self_is_fatal() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);
        let err = feed(
            started(),
            vec![
                authorized(&world),
                cave_of(&world),
                Response::StateLocations {
                    item_locations: world.snapshot.items.clone(),
                    player_locations: vec![],
                },
            ],
            &mut agent,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::SelfLocationMissing { .. }));
    }

    #[test]
    fn locations_outside_the_cave_are_a_violation() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);
        let mut players = world.snapshot.players.clone();
        players[0].location = Location::new(9, 9);
        let err = feed(
            started(),
            vec![
                authorized(&world),
                cave_of(&world),
                Response::StateLocations {
                    item_locations: vec![],
                    player_locations: players,
                },
            ],
            &mut agent,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolViolation::OutsideCave(_))
        ));
    }

    #[test]
    fn cave_may_be_resent_but_not_resized() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);
        let transition = feed(
            started(),
            vec![cave_of(&world), cave_of(&world)],
            &mut agent,
        )
        .unwrap();
        assert_eq!(transition.state.phase(), Phase::Idle);

        let err = step(
            transition.state,
            Response::StateCave {
                cave: Cave::from_fn(4, 4, |_| false),
            },
            &mut agent,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolViolation::CaveResized { .. })
        ));
    }

    #[test]
    fn identity_cannot_change() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);
        let err = feed(
            started(),
            vec![
                authorized(&world),
                authorized(&world),
                Response::Authorized {
                    human_player: Player::human("someone-else"),
                },
            ],
            &mut agent,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolViolation::IdentityChanged { .. })
        ));
    }

    #[test]
    fn closed_session_ignores_messages() {
        let world = scenario(OPEN);
        let mut agent = PlanningAgent::seeded(0);
        let transition = step(started().close(), locations_of(&world), &mut agent).unwrap();
        assert_eq!(transition.state.phase(), Phase::Closed);
        assert_eq!(transition.command, None);
    }
}
