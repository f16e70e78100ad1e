use bevy::prelude::*;

pub const NO_RACE_MANAGER_STATUS: &str = "No Race Manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RaceState {
    #[default]
    Waiting,
    Countdown,
    Racing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    Holding,
    Announce(u32),
    Go,
}

#[derive(Component, Debug, Clone, PartialEq)]
pub struct RaceManager {
    pub state: RaceState,
    pub countdown_duration_s: f32,
    pub countdown_s: f32,
    pub race_start_time_s: f32,
    pub race_started: bool,
    pub total_checkpoints: usize,
    pub auto_start_delay_s: f32,
    pub waiting_elapsed_s: f32,
    pub discovered: bool,
    last_announced_count: Option<u32>,
}

impl RaceManager {
    pub fn new(countdown_duration_s: f32, auto_start_delay_s: f32) -> Self {
        Self {
            state: RaceState::Waiting,
            countdown_duration_s,
            countdown_s: countdown_duration_s,
            race_start_time_s: 0.0,
            race_started: false,
            total_checkpoints: 0,
            auto_start_delay_s,
            waiting_elapsed_s: 0.0,
            discovered: false,
            last_announced_count: None,
        }
    }

    /// WAITING -> COUNTDOWN. Any other state ignores the request.
    pub fn request_start(&mut self) -> bool {
        if self.state != RaceState::Waiting {
            return false;
        }

        self.state = RaceState::Countdown;
        self.countdown_s = self.countdown_duration_s;
        self.last_announced_count = None;
        true
    }

    /// Counts time spent waiting and starts the countdown once the auto-start delay has passed.
    pub fn tick_waiting(&mut self, dt: f32) -> bool {
        if self.state != RaceState::Waiting {
            return false;
        }

        self.waiting_elapsed_s += dt;
        self.waiting_elapsed_s >= self.auto_start_delay_s && self.request_start()
    }

    pub fn tick_countdown(&mut self, dt: f32, now_s: f32) -> CountdownTick {
        if self.state != RaceState::Countdown {
            return CountdownTick::Holding;
        }

        self.countdown_s -= dt;
        if self.countdown_s <= 0.0 {
            self.countdown_s = 0.0;
            self.state = RaceState::Racing;
            self.race_started = true;
            self.race_start_time_s = now_s;
            return CountdownTick::Go;
        }

        let count = self.countdown_display();
        if self.last_announced_count == Some(count) {
            return CountdownTick::Holding;
        }
        self.last_announced_count = Some(count);
        CountdownTick::Announce(count)
    }

    /// RACING -> FINISHED once every player (and at least one) has completed the race.
    pub fn finish_if_all_completed(&mut self, completed: impl IntoIterator<Item = bool>) -> bool {
        if self.state != RaceState::Racing {
            return false;
        }

        let mut player_count = 0;
        for player_completed in completed {
            if !player_completed {
                return false;
            }
            player_count += 1;
        }
        if player_count == 0 {
            return false;
        }

        self.state = RaceState::Finished;
        true
    }

    pub fn reset(&mut self) {
        self.state = RaceState::Waiting;
        self.countdown_s = self.countdown_duration_s;
        self.race_start_time_s = 0.0;
        self.race_started = false;
        self.waiting_elapsed_s = 0.0;
        self.last_announced_count = None;
    }

    pub fn countdown_display(&self) -> u32 {
        self.countdown_s.max(0.0).ceil() as u32
    }

    pub fn is_race_active(&self) -> bool {
        self.state == RaceState::Racing
    }

    pub fn is_input_disabled(&self) -> bool {
        !self.is_race_active()
    }

    pub fn status_text(&self) -> String {
        match self.state {
            RaceState::Waiting => "Press R to Start Race".to_string(),
            RaceState::Countdown => format!("Get Ready... {}", self.countdown_display()),
            RaceState::Racing => "Racing!".to_string(),
            RaceState::Finished => "Race Finished! Press R to Restart".to_string(),
        }
    }
}

pub fn race_status_text(manager: Option<&RaceManager>) -> String {
    manager
        .map(RaceManager::status_text)
        .unwrap_or_else(|| NO_RACE_MANAGER_STATUS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_S: f32 = 0.1;

    fn run_countdown(manager: &mut RaceManager, seconds: f32) -> Vec<CountdownTick> {
        let ticks = (seconds / TICK_S).round() as usize;
        (0..ticks)
            .map(|tick| manager.tick_countdown(TICK_S, tick as f32 * TICK_S))
            .filter(|tick| *tick != CountdownTick::Holding)
            .collect()
    }

    #[test]
    fn countdown_of_three_seconds_starts_race_after_three_point_one() {
        let mut manager = RaceManager::new(3.0, 2.0);
        assert!(manager.request_start());

        run_countdown(&mut manager, 3.1);

        assert_eq!(manager.state, RaceState::Racing);
        assert!(manager.race_started);
    }

    #[test]
    fn countdown_announces_each_whole_second_once() {
        let mut manager = RaceManager::new(3.0, 2.0);
        manager.request_start();

        let ticks = run_countdown(&mut manager, 3.2);

        assert_eq!(
            ticks,
            vec![
                CountdownTick::Announce(3),
                CountdownTick::Announce(2),
                CountdownTick::Announce(1),
                CountdownTick::Go,
            ]
        );
    }

    #[test]
    fn waiting_never_jumps_straight_to_racing_or_finished() {
        let mut manager = RaceManager::new(3.0, 2.0);

        assert!(!manager.finish_if_all_completed([true]));
        assert_eq!(manager.tick_countdown(10.0, 0.0), CountdownTick::Holding);
        assert_eq!(manager.state, RaceState::Waiting);

        assert!(manager.request_start());
        assert_eq!(manager.state, RaceState::Countdown);
    }

    #[test]
    fn auto_start_waits_for_delay() {
        let mut manager = RaceManager::new(3.0, 2.0);

        assert!(!manager.tick_waiting(1.5));
        assert_eq!(manager.state, RaceState::Waiting);
        assert!(manager.tick_waiting(0.6));
        assert_eq!(manager.state, RaceState::Countdown);
        assert!(!manager.tick_waiting(5.0));
    }

    #[test]
    fn finish_requires_every_player_and_at_least_one() {
        let mut manager = RaceManager::new(3.0, 2.0);
        manager.request_start();
        manager.tick_countdown(5.0, 5.0);

        assert!(!manager.finish_if_all_completed(Vec::new()));
        assert!(!manager.finish_if_all_completed([true, false]));
        assert_eq!(manager.state, RaceState::Racing);

        assert!(manager.finish_if_all_completed([true, true]));
        assert_eq!(manager.state, RaceState::Finished);
    }

    #[test]
    fn reset_returns_to_waiting_and_is_idempotent() {
        let mut manager = RaceManager::new(3.0, 2.0);
        manager.request_start();
        manager.tick_countdown(4.0, 4.0);
        manager.finish_if_all_completed([true]);

        manager.reset();
        let once = manager.clone();
        manager.reset();

        assert_eq!(manager, once);
        assert_eq!(manager.state, RaceState::Waiting);
        assert!(!manager.race_started);
        assert!((manager.countdown_s - 3.0).abs() < f32::EPSILON);
        assert_eq!(manager.waiting_elapsed_s, 0.0);
    }

    #[test]
    fn input_is_enabled_only_while_racing() {
        let mut manager = RaceManager::new(3.0, 2.0);
        assert!(manager.is_input_disabled());

        manager.request_start();
        assert!(manager.is_input_disabled());

        manager.tick_countdown(3.5, 3.5);
        assert!(!manager.is_input_disabled());

        manager.finish_if_all_completed([true]);
        assert!(manager.is_input_disabled());
    }

    #[test]
    fn status_strings_follow_state() {
        let mut manager = RaceManager::new(3.0, 2.0);
        assert_eq!(race_status_text(None), "No Race Manager");
        assert_eq!(race_status_text(Some(&manager)), "Press R to Start Race");

        manager.request_start();
        manager.tick_countdown(0.5, 0.5);
        assert_eq!(manager.status_text(), "Get Ready... 3");

        manager.tick_countdown(1.0, 1.5);
        assert_eq!(manager.status_text(), "Get Ready... 2");

        manager.tick_countdown(2.0, 3.5);
        assert_eq!(manager.status_text(), "Racing!");

        manager.finish_if_all_completed([true]);
        assert_eq!(manager.status_text(), "Race Finished! Press R to Restart");
    }
}
