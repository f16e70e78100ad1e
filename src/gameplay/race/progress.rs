use bevy::prelude::*;

#[derive(Component, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub index: usize,
    pub radius: f32,
    pub is_finish_line: bool,
    pub visible: bool,
}

/// Per-player race progress. `best_lap_time_s == 0.0` means no lap has been completed.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct RacePlayer {
    pub current_lap: u32,
    pub max_laps: u32,
    pub next_checkpoint_index: usize,
    pub position: u32,
    pub race_time_s: f32,
    pub current_lap_time_s: f32,
    pub best_lap_time_s: f32,
    pub lap_times: Vec<f32>,
    pub race_completed: bool,
}

impl RacePlayer {
    pub fn new(max_laps: u32) -> Self {
        Self {
            current_lap: 1,
            max_laps,
            next_checkpoint_index: 0,
            position: 1,
            race_time_s: 0.0,
            current_lap_time_s: 0.0,
            best_lap_time_s: 0.0,
            lap_times: Vec::new(),
            race_completed: false,
        }
    }

    pub fn advance_timers(&mut self, dt: f32) {
        self.race_time_s += dt;
        self.current_lap_time_s += dt;
    }

    /// Back to the grid. The finish line was already crossed at the start, so checkpoint 1 is next,
    /// wrapping to the finish line itself on a single-checkpoint track.
    pub fn reset(&mut self, checkpoint_count: usize) {
        self.current_lap = 1;
        self.next_checkpoint_index = 1 % checkpoint_count.max(1);
        self.position = 1;
        self.race_time_s = 0.0;
        self.current_lap_time_s = 0.0;
        self.best_lap_time_s = 0.0;
        self.lap_times.clear();
        self.race_completed = false;
    }

    pub fn best_lap(&self) -> Option<f32> {
        (self.best_lap_time_s > 0.0).then_some(self.best_lap_time_s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointTarget {
    pub index: usize,
    pub position: Vec3,
    pub radius: f32,
    pub is_finish_line: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    CheckpointReached { index: usize },
    LapCompleted { completed_lap: u32, lap_time_s: f32 },
    RaceCompleted { race_time_s: f32, best_lap_s: f32 },
}

/// Sorts by checkpoint index so `targets[i].index == i` on a validated track.
pub fn order_checkpoints(mut targets: Vec<CheckpointTarget>) -> Vec<CheckpointTarget> {
    targets.sort_by_key(|target| target.index);
    targets
}

pub fn distance_to_next_checkpoint(
    player: &RacePlayer,
    position: Vec3,
    checkpoints: &[CheckpointTarget],
) -> f32 {
    checkpoints
        .get(player.next_checkpoint_index)
        .map(|checkpoint| position.distance(checkpoint.position))
        .unwrap_or(0.0)
}

/// Advances `player` if `position` lies inside its next checkpoint.
///
/// A finish-line crossing only counts as a lap once `race_time_s` exceeds `lap_guard_s`, which
/// keeps the start-grid crossing from registering.
pub fn check_player_progress(
    player: &mut RacePlayer,
    position: Vec3,
    checkpoints: &[CheckpointTarget],
    lap_guard_s: f32,
) -> Option<ProgressEvent> {
    let checkpoint = *checkpoints.get(player.next_checkpoint_index)?;
    if position.distance(checkpoint.position) > checkpoint.radius {
        return None;
    }

    player.next_checkpoint_index += 1;
    let mut event = ProgressEvent::CheckpointReached {
        index: checkpoint.index,
    };

    if checkpoint.is_finish_line
        && player.next_checkpoint_index == 1
        && player.race_time_s > lap_guard_s
    {
        let lap_time_s = player.current_lap_time_s;
        player.lap_times.push(lap_time_s);
        player.best_lap_time_s = match player.best_lap() {
            Some(best) => best.min(lap_time_s),
            None => lap_time_s,
        };
        player.current_lap_time_s = 0.0;
        let completed_lap = player.current_lap;
        player.current_lap += 1;

        event = if player.current_lap > player.max_laps {
            player.race_completed = true;
            ProgressEvent::RaceCompleted {
                race_time_s: player.race_time_s,
                best_lap_s: player.best_lap_time_s,
            }
        } else {
            player.next_checkpoint_index = 1;
            ProgressEvent::LapCompleted {
                completed_lap,
                lap_time_s,
            }
        };
    }

    if player.next_checkpoint_index >= checkpoints.len() {
        player.next_checkpoint_index = 0;
    }

    Some(event)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingEntry {
    pub lap: u32,
    pub next_checkpoint_index: usize,
    pub distance_to_next_m: f32,
}

/// 1-based positions aligned with `entries`; ties keep their input order.
pub fn rank_positions(entries: &[RankingEntry]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&entries[a], &entries[b]);
        b.lap
            .cmp(&a.lap)
            .then(b.next_checkpoint_index.cmp(&a.next_checkpoint_index))
            .then(a.distance_to_next_m.total_cmp(&b.distance_to_next_m))
    });

    let mut positions = vec![0; entries.len()];
    for (rank, entry_index) in order.into_iter().enumerate() {
        positions[entry_index] = rank as u32 + 1;
    }
    positions
}

/// Checkpoint `i` is visible iff some player targets it next.
pub fn targeted_checkpoints(
    next_indices: impl IntoIterator<Item = usize>,
    checkpoint_count: usize,
) -> Vec<bool> {
    let mut visible = vec![false; checkpoint_count];
    for index in next_indices {
        if let Some(slot) = visible.get_mut(index) {
            *slot = true;
        }
    }
    visible
}
