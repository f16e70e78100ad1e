use crate::gameplay::race::{RaceOverview, RaceState};
use crate::gameplay::vehicle::{speed_kmh, VehicleTelemetry};
use crate::states::GameState;
use bevy::prelude::*;

const HUD_PANEL_Z_INDEX: i32 = 190;
const HUD_PANEL_BG: Color = Color::srgba(0.06, 0.09, 0.12, 0.86);
const HUD_PANEL_BORDER: Color = Color::srgba(0.58, 0.68, 0.76, 0.92);
const HUD_TEXT_PRIMARY: Color = Color::srgb(0.94, 0.97, 1.0);
const HUD_TEXT_MUTED: Color = Color::srgb(0.76, 0.83, 0.9);
const HUD_TEXT_COUNTDOWN: Color = Color::srgb(1.0, 0.86, 0.32);

pub struct RaceHudPlugin;

impl Plugin for RaceHudPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::InRun), spawn_race_hud)
            .add_systems(
                Update,
                update_race_hud.run_if(in_state(GameState::InRun)),
            );
    }
}

#[derive(Component)]
struct RaceHudRoot;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
enum HudTextKind {
    Status,
    RaceTime,
    Lap,
    Position,
    BestLap,
    Speed,
    Countdown,
}

fn spawn_race_hud(mut commands: Commands, existing_hud: Query<Entity, With<RaceHudRoot>>) {
    // Resuming from pause re-enters InRun; the HUD survives the pause.
    if !existing_hud.is_empty() {
        return;
    }

    commands
        .spawn((
            Name::new("RaceHudRoot"),
            RaceHudRoot,
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(12.0),
                right: Val::Px(12.0),
                top: Val::Px(10.0),
                justify_content: JustifyContent::SpaceBetween,
                align_items: AlignItems::FlexStart,
                ..default()
            },
            ZIndex(HUD_PANEL_Z_INDEX),
        ))
        .with_children(|root| {
            root.spawn((
                Name::new("RaceHudMainPanel"),
                Node {
                    width: Val::Px(340.0),
                    max_width: Val::Percent(50.0),
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(6.0),
                    padding: UiRect::all(Val::Px(12.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    ..default()
                },
                BackgroundColor(HUD_PANEL_BG),
                BorderColor::all(HUD_PANEL_BORDER),
            ))
            .with_children(|panel| {
                spawn_hud_text(panel, HudTextKind::Status, "No Race Manager", 22.0, HUD_TEXT_PRIMARY);
                spawn_hud_text(panel, HudTextKind::RaceTime, "Time 0:00.00", 20.0, HUD_TEXT_PRIMARY);
                spawn_hud_text(panel, HudTextKind::Lap, "Lap 1 / 0", 18.0, HUD_TEXT_PRIMARY);
                spawn_hud_text(panel, HudTextKind::Position, "Position 1 / 0", 18.0, HUD_TEXT_PRIMARY);
                spawn_hud_text(panel, HudTextKind::BestLap, "Best Lap --", 16.0, HUD_TEXT_MUTED);
            });

            root.spawn((
                Name::new("RaceHudCountdown"),
                Node {
                    flex_grow: 1.0,
                    justify_content: JustifyContent::Center,
                    padding: UiRect::top(Val::Px(120.0)),
                    ..default()
                },
            ))
            .with_children(|center| {
                spawn_hud_text(center, HudTextKind::Countdown, "", 96.0, HUD_TEXT_COUNTDOWN);
            });

            root.spawn((
                Name::new("RaceHudSpeedPanel"),
                Node {
                    padding: UiRect::all(Val::Px(12.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    ..default()
                },
                BackgroundColor(HUD_PANEL_BG),
                BorderColor::all(HUD_PANEL_BORDER),
            ))
            .with_children(|panel| {
                spawn_hud_text(panel, HudTextKind::Speed, "0 km/h", 30.0, HUD_TEXT_PRIMARY);
            });
        });
}

fn spawn_hud_text(
    parent: &mut ChildSpawnerCommands,
    kind: HudTextKind,
    initial: &str,
    font_size: f32,
    color: Color,
) {
    parent.spawn((
        kind,
        Text::new(initial),
        TextFont {
            font_size,
            ..default()
        },
        TextColor(color),
    ));
}

fn update_race_hud(
    overview: Res<RaceOverview>,
    telemetry: Option<Res<VehicleTelemetry>>,
    mut text_query: Query<(&HudTextKind, &mut Text)>,
) {
    let speed_mps = telemetry
        .map(|telemetry| telemetry.speed_mps)
        .unwrap_or(overview.speed_mps);

    for (kind, mut text) in &mut text_query {
        let next = match kind {
            HudTextKind::Status => overview.status.clone(),
            HudTextKind::RaceTime => format!("Time {}", format_race_time(overview.race_time_s)),
            HudTextKind::Lap => format!(
                "Lap {} / {}",
                overview.current_lap.min(overview.max_laps.max(1)),
                overview.max_laps
            ),
            HudTextKind::Position => {
                format!("Position {} / {}", overview.position, overview.player_count)
            }
            HudTextKind::BestLap => match overview.best_lap_s {
                Some(best) => format!("Best Lap {}", format_race_time(best)),
                None => "Best Lap --".to_string(),
            },
            HudTextKind::Speed => format!("{:.0} km/h", speed_kmh(speed_mps)),
            HudTextKind::Countdown => countdown_banner(&overview),
        };

        if text.0 != next {
            text.0 = next;
        }
    }
}

fn countdown_banner(overview: &RaceOverview) -> String {
    if overview.is_race_active() {
        return if overview.race_time_s < 1.0 {
            "GO!".to_string()
        } else {
            String::new()
        };
    }
    match overview.state {
        Some(RaceState::Countdown) if overview.countdown > 0 => overview.countdown.to_string(),
        Some(RaceState::Finished) => "FINISH".to_string(),
        _ => String::new(),
    }
}

/// `m:ss.cc`, clamped at zero.
fn format_race_time(seconds: f32) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let minutes = centis / 6_000;
    let secs = (centis / 100) % 60;
    let hundredths = centis % 100;
    format!("{minutes}:{secs:02}.{hundredths:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_time_formats_minutes_and_hundredths() {
        assert_eq!(format_race_time(0.0), "0:00.00");
        assert_eq!(format_race_time(-3.0), "0:00.00");
        assert_eq!(format_race_time(65.432), "1:05.43");
        assert_eq!(format_race_time(600.0), "10:00.00");
    }

    #[test]
    fn countdown_banner_follows_race_state() {
        let mut overview = RaceOverview {
            state: Some(RaceState::Countdown),
            countdown: 2,
            ..RaceOverview::default()
        };
        assert_eq!(countdown_banner(&overview), "2");

        overview.state = Some(RaceState::Racing);
        overview.race_time_s = 0.4;
        assert_eq!(countdown_banner(&overview), "GO!");

        overview.race_time_s = 5.0;
        assert_eq!(countdown_banner(&overview), "");

        overview.state = Some(RaceState::Finished);
        assert_eq!(countdown_banner(&overview), "FINISH");

        overview.state = None;
        overview.race_time_s = 0.0;
        assert_eq!(countdown_banner(&overview), "");
    }
}
