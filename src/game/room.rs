//! Room state and the authoritative tick loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::game::combat::{CombatSystem, WeaponStats};
use crate::game::physics::PhysicsWorld;
use crate::game::player::Player;
use crate::game::snapshot::SnapshotBuilder;
use crate::game::{MovementMode, RoomError};
use crate::util::time::{unix_millis, TICK_DURATION_MICROS};
use crate::ws::protocol::{GameEvent, InputFrame, PlayerSnapshot, ServerMsg, WorldSnapshot};

/// Commands delivered to a room's task. Inputs are buffered for the next
/// tick; everything else is resolved immediately on receipt.
#[derive(Debug)]
pub enum RoomCommand {
    /// Begin ticking (idempotent)
    Start,
    /// Stop ticking (idempotent); state is preserved
    Stop,
    /// Tear the room down
    Shutdown,
    Join {
        conn_id: Uuid,
        name: String,
        /// Direct channel to the joining connection for the init message
        reply: mpsc::Sender<ServerMsg>,
    },
    Leave {
        conn_id: Uuid,
    },
    Input {
        conn_id: Uuid,
        frame: InputFrame,
    },
    Position {
        conn_id: Uuid,
        pos: [f32; 3],
        yaw: f32,
    },
    Shoot {
        conn_id: Uuid,
        target_id: Uuid,
        damage: f32,
    },
    Respawn {
        conn_id: Uuid,
    },
}

/// Result of a validated, applied shot
#[derive(Debug, Clone, PartialEq)]
pub struct ShotOutcome {
    pub target_id: Uuid,
    pub health: f32,
    pub killed: bool,
}

/// Room state, exclusively owned by the room task (single-writer)
pub struct RoomState {
    pub id: String,
    pub tick: u64,
    pub players: HashMap<Uuid, Player>,
    pub physics: PhysicsWorld,
    movement_mode: MovementMode,
    pending_events: Vec<GameEvent>,
}

impl RoomState {
    pub fn new(id: String, movement_mode: MovementMode) -> Self {
        Self {
            id,
            tick: 0,
            players: HashMap::new(),
            physics: PhysicsWorld::new(),
            movement_mode,
            pending_events: Vec::new(),
        }
    }

    /// Create a player with its physics body at the spawn point
    pub fn join(&mut self, conn_id: Uuid, name: String) -> Result<PlayerSnapshot, RoomError> {
        if self.players.contains_key(&conn_id) {
            return Err(RoomError::StateConflict);
        }
        let player = Player::new(conn_id, name, &mut self.physics);
        let snapshot = player.snapshot(&self.physics);
        self.players.insert(conn_id, player);
        Ok(snapshot)
    }

    /// Destroy a player and its body. Returns false when unknown (no-op).
    pub fn leave(&mut self, conn_id: Uuid) -> bool {
        match self.players.remove(&conn_id) {
            Some(player) => {
                player.destroy(&mut self.physics);
                true
            }
            None => false,
        }
    }

    /// Buffer a movement input for the next tick (latest wins, stale
    /// sequence numbers discarded). Rejected outright in position-echo mode.
    pub fn buffer_input(&mut self, conn_id: Uuid, frame: InputFrame) -> Result<bool, RoomError> {
        if self.movement_mode != MovementMode::InputDriven {
            return Err(RoomError::Protocol("input movement disabled"));
        }
        let player = self
            .players
            .get_mut(&conn_id)
            .ok_or(RoomError::UnknownTarget)?;
        player.buffer_input(frame)
    }

    /// Accept a raw position report. Rejected outright in input-driven mode.
    pub fn set_position(
        &mut self,
        conn_id: Uuid,
        pos: [f32; 3],
        yaw: f32,
    ) -> Result<(), RoomError> {
        if self.movement_mode != MovementMode::PositionEcho {
            return Err(RoomError::Protocol("position echo disabled"));
        }
        let player = self
            .players
            .get_mut(&conn_id)
            .ok_or(RoomError::UnknownTarget)?;
        player.set_reported_position(&mut self.physics, pos, yaw)
    }

    /// Resolve a hit-scan shot against current authoritative state.
    /// Called immediately on receipt, never deferred to the tick boundary.
    pub fn shoot(
        &mut self,
        shooter_id: Uuid,
        target_id: Uuid,
        claimed_damage: f32,
    ) -> Result<ShotOutcome, RoomError> {
        let shooter = self
            .players
            .get(&shooter_id)
            .ok_or(RoomError::UnknownTarget)?;
        let target = self
            .players
            .get(&target_id)
            .ok_or(RoomError::UnknownTarget)?;
        if !shooter.is_alive() || !target.is_alive() {
            return Err(RoomError::StateConflict);
        }

        let weapon = WeaponStats::for_index(shooter.weapon_idx);
        let shooter_pos = self.physics.position(shooter.body);
        let target_pos = self.physics.position(target.body);
        let distance = distance3(shooter_pos, target_pos);
        let now = unix_millis();

        let damage = CombatSystem::validate_shot(
            &weapon,
            claimed_damage,
            distance,
            shooter.ammo,
            now,
            shooter.last_shot_ms,
        )?;

        {
            let shooter = self
                .players
                .get_mut(&shooter_id)
                .ok_or(RoomError::UnknownTarget)?;
            shooter.ammo -= 1;
            shooter.last_shot_ms = now;
        }

        let (health, killed) = {
            let target = self
                .players
                .get_mut(&target_id)
                .ok_or(RoomError::UnknownTarget)?;
            let (health, killed) = CombatSystem::apply_damage(target.health, damage);
            target.health = health;
            if killed {
                target.kill();
            }
            (health, killed)
        };

        self.pending_events.push(GameEvent::Hit {
            shooter_id,
            target_id,
            damage,
        });

        if killed {
            if let Some(shooter) = self.players.get_mut(&shooter_id) {
                shooter.kills += 1;
                shooter.score += CombatSystem::kill_score(damage);
            }
            self.pending_events.push(GameEvent::Death {
                victim_id: target_id,
                killer_id: shooter_id,
            });
        }

        Ok(ShotOutcome {
            target_id,
            health,
            killed,
        })
    }

    /// Respawn a dead player
    pub fn respawn(&mut self, conn_id: Uuid) -> Result<PlayerSnapshot, RoomError> {
        let player = self
            .players
            .get_mut(&conn_id)
            .ok_or(RoomError::UnknownTarget)?;
        player.respawn(&mut self.physics)?;
        Ok(player.snapshot(&self.physics))
    }

    /// One fixed simulation step: inputs, physics, post-physics corrections.
    /// The order is fixed and never suspends.
    pub fn run_tick(&mut self) {
        self.tick += 1;

        for player in self.players.values_mut() {
            player.apply_pending_input(&mut self.physics);
        }

        self.physics.step_tick();

        for player in self.players.values_mut() {
            if player.enforce_kill_plane(&mut self.physics) {
                trace!(room_id = %self.id, player_id = %player.id, "Fell out of level, respawned at spawn point");
            }
        }
    }

    /// Serialize all players for the wire
    pub fn snapshot_players(&self) -> HashMap<Uuid, PlayerSnapshot> {
        self.players
            .iter()
            .map(|(id, p)| (*id, p.snapshot(&self.physics)))
            .collect()
    }

    /// Take the events accumulated since the last snapshot
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

fn distance3(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: String,
    pub cmd_tx: mpsc::Sender<RoomCommand>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    /// Begin ticking; a no-op if already running
    pub async fn start(&self) {
        let _ = self.cmd_tx.send(RoomCommand::Start).await;
    }

    /// Stop ticking; a no-op if already stopped
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(RoomCommand::Stop).await;
    }

    pub async fn send(&self, cmd: RoomCommand) {
        let _ = self.cmd_tx.send(cmd).await;
    }
}

/// The authoritative per-room game loop, run as a dedicated task.
/// All mutation of the room's physics and player map happens here.
pub struct GameRoom {
    state: RoomState,
    cmd_rx: mpsc::Receiver<RoomCommand>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    ticker: Interval,
    running: bool,
    player_count: Arc<AtomicUsize>,
}

impl GameRoom {
    /// Create a room and spawn its task. The room starts stopped; the
    /// caller sends `Start` to begin ticking.
    pub fn spawn(id: String, movement_mode: MovementMode, snapshot_every: u32) -> RoomHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: id.clone(),
            cmd_tx,
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
        };

        let room = Self {
            state: RoomState::new(id, movement_mode),
            cmd_rx,
            broadcast_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_every),
            ticker: Self::new_ticker(),
            running: false,
            player_count,
        };

        tokio::spawn(room.run());
        handle
    }

    fn new_ticker() -> Interval {
        let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
        // Overrun ticks are coalesced, never run concurrently or queued
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Run the room task: commands are interleaved with ticks on a single
    /// task, so every mutation is serialized and stop is safe at any point.
    pub async fn run(mut self) {
        info!(room_id = %self.state.id, "Room task started");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(RoomCommand::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                _ = self.ticker.tick(), if self.running => {
                    self.run_tick();
                }
            }
        }

        info!(room_id = %self.state.id, "Room task stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Start => {
                if self.running {
                    debug!(room_id = %self.state.id, "Start ignored, already running");
                    return;
                }
                self.ticker = Self::new_ticker();
                self.running = true;
                info!(room_id = %self.state.id, "Room loop started");
            }
            RoomCommand::Stop => {
                if self.running {
                    self.running = false;
                    info!(room_id = %self.state.id, tick = self.state.tick, "Room loop stopped");
                }
            }
            RoomCommand::Shutdown => unreachable!("handled by the run loop"),
            RoomCommand::Join {
                conn_id,
                name,
                reply,
            } => self.handle_join(conn_id, name, reply),
            RoomCommand::Leave { conn_id } => self.handle_leave(conn_id),
            RoomCommand::Input { conn_id, frame } => match self.state.buffer_input(conn_id, frame)
            {
                Ok(true) => {}
                Ok(false) => {
                    trace!(room_id = %self.state.id, conn_id = %conn_id, seq = frame.seq, "Stale input discarded");
                }
                Err(e) => {
                    debug!(room_id = %self.state.id, conn_id = %conn_id, error = %e, "Input dropped");
                }
            },
            RoomCommand::Position { conn_id, pos, yaw } => {
                if let Err(e) = self.state.set_position(conn_id, pos, yaw) {
                    debug!(room_id = %self.state.id, conn_id = %conn_id, error = %e, "Position report dropped");
                }
            }
            RoomCommand::Shoot {
                conn_id,
                target_id,
                damage,
            } => self.handle_shoot(conn_id, target_id, damage),
            RoomCommand::Respawn { conn_id } => match self.state.respawn(conn_id) {
                Ok(snapshot) => {
                    let _ = self
                        .broadcast_tx
                        .send(ServerMsg::PlayerRespawned { player: snapshot });
                    info!(room_id = %self.state.id, conn_id = %conn_id, "Player respawned");
                }
                Err(e) => {
                    debug!(room_id = %self.state.id, conn_id = %conn_id, error = %e, "Respawn dropped");
                }
            },
        }
    }

    fn handle_join(&mut self, conn_id: Uuid, name: String, reply: mpsc::Sender<ServerMsg>) {
        match self.state.join(conn_id, name) {
            Ok(snapshot) => {
                self.player_count
                    .store(self.state.players.len(), Ordering::Relaxed);

                let _ = self
                    .broadcast_tx
                    .send(ServerMsg::PlayerJoined { player: snapshot });

                // Direct init for the joiner: own id plus the full room state
                let init = ServerMsg::Init {
                    id: conn_id,
                    snapshot: WorldSnapshot {
                        tick: self.state.tick,
                        players: self.state.snapshot_players(),
                        events: Vec::new(),
                    },
                };
                if reply.try_send(init).is_err() {
                    debug!(room_id = %self.state.id, conn_id = %conn_id, "Init not delivered, connection gone");
                }

                info!(
                    room_id = %self.state.id,
                    conn_id = %conn_id,
                    player_count = self.state.players.len(),
                    "Player joined room"
                );
            }
            Err(e) => {
                warn!(room_id = %self.state.id, conn_id = %conn_id, error = %e, "Join rejected");
            }
        }
    }

    fn handle_leave(&mut self, conn_id: Uuid) {
        if self.state.leave(conn_id) {
            self.player_count
                .store(self.state.players.len(), Ordering::Relaxed);
            let _ = self.broadcast_tx.send(ServerMsg::PlayerLeft { id: conn_id });
            info!(room_id = %self.state.id, conn_id = %conn_id, "Player left room");
        } else {
            debug!(room_id = %self.state.id, conn_id = %conn_id, "Leave for unknown connection ignored");
        }
    }

    fn handle_shoot(&mut self, conn_id: Uuid, target_id: Uuid, damage: f32) {
        match self.state.shoot(conn_id, target_id, damage) {
            Ok(outcome) => {
                let _ = self.broadcast_tx.send(ServerMsg::PlayerHit {
                    id: outcome.target_id,
                    health: outcome.health,
                });

                if outcome.killed {
                    // Deaths should reach clients on the very next tick even
                    // when snapshots are decimated
                    self.snapshot_builder.force_next();
                    let _ = self.broadcast_tx.send(ServerMsg::PlayerDied {
                        victim_id: outcome.target_id,
                        killer_id: conn_id,
                        players: self.state.snapshot_players(),
                    });
                    info!(
                        room_id = %self.state.id,
                        victim = %outcome.target_id,
                        killer = %conn_id,
                        "Player killed"
                    );
                }
            }
            Err(e) => {
                debug!(room_id = %self.state.id, conn_id = %conn_id, target = %target_id, error = %e, "Shot dropped");
            }
        }
    }

    fn run_tick(&mut self) {
        self.state.run_tick();

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(
                self.state.tick,
                self.state.snapshot_players(),
                self.state.drain_events(),
            );
            // Droppable delivery: a lagged subscriber just misses snapshots,
            // the next one supersedes them.
            let _ = self.broadcast_tx.send(snapshot);
        }
    }
}
