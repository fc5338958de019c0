//! Session driver shared by `replay` and `run`.

use dino::{Bridge, BridgeConfig, Loader, Snapshot, SnapshotError, encode, format_frame};
use futures::executor::block_on;
use tracing::{debug, error, info};

use crate::cli::{DriveArgs, EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::{Tally, print_frame};
use crate::terminal;

/// Acquire a producer through `loader` and step it frame by frame.
pub fn cmd_drive<L: Loader>(loader: L, args: &DriveArgs, config: BridgeConfig) -> i32 {
    let bridge = Bridge::new(loader, config);
    if !block_on(bridge.init()) {
        terminal::error("producer unavailable");
        return EXIT_FAILURE;
    }

    bridge.start();
    let mut tally = Tally::default();
    let mut jumps = 0usize;
    let mut timestamp = 0.0f32;
    let mut frames = 0usize;
    let mut recording = args.record.as_ref().map(|_| Vec::new());

    while frames < args.frames {
        let result = bridge.try_snapshot();
        tally.record(&result);
        print_frame(args.format, frames, &result);
        if let Some(lines) = recording.as_mut() {
            lines.push(record_line(frames, &result));
        }
        frames += 1;

        if let (Some(distance), Ok(snapshot)) = (args.auto_jump, &result) {
            if should_jump(snapshot, distance) && bridge.jump() {
                debug!(frame = frames - 1, "jumped");
                jumps += 1;
            }
        }

        if bridge.is_over() {
            info!(frame = frames - 1, "game over");
            break;
        }
        timestamp += args.frame_ms;
        bridge.step(timestamp);
    }

    let score = bridge.score();
    let high_score = bridge.high_score();
    bridge.shutdown();

    tally.report();
    terminal::dim(&format!(
        "{frames} frames, {jumps} jumps, score {score}, high score {high_score}"
    ));

    if let (Some(path), Some(lines)) = (&args.record, recording) {
        let mut text = lines.join("\n");
        text.push('\n');
        if let Err(e) = std::fs::write(path, text) {
            error!(error = %e, path = %path.display(), "failed to write recording");
            return EXIT_FAILURE;
        }
        terminal::success(&format!("recorded {frames} frames to {}", path.display()));
    }
    EXIT_SUCCESS
}

/// Frame-file line for one frame. Rejected frames become comments.
fn record_line(frame: usize, result: &Result<Snapshot, SnapshotError>) -> String {
    match result {
        Ok(snapshot) => format_frame(&encode(snapshot)),
        Err(SnapshotError::NullBuffer) => "null".to_string(),
        Err(e) => format!("# frame {frame}: {e}"),
    }
}

/// Jump when grounded and the nearest obstacle ahead is within `distance`.
fn should_jump(snapshot: &Snapshot, distance: f32) -> bool {
    let actor = &snapshot.actor;
    if actor.is_airborne || actor.is_destroyed {
        return false;
    }
    let front = actor.x + actor.width;
    snapshot
        .nearest_obstacle_ahead(front)
        .is_some_and(|o| o.x - front <= distance)
}

#[cfg(test)]
mod tests {
    use dino::{Actor, DecodeError, Obstacle, ObstacleKind, parse_frames};

    use super::*;

    fn snapshot(obstacle_x: f32, airborne: bool) -> Snapshot {
        Snapshot {
            actor: Actor {
                x: 10.0,
                width: 40.0,
                is_airborne: airborne,
                ..Actor::default()
            },
            obstacles: vec![Obstacle {
                x: obstacle_x,
                y: 0.0,
                width: 20.0,
                height: 40.0,
                kind: ObstacleKind::Small,
            }],
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_should_jump() {
        assert!(should_jump(&snapshot(90.0, false), 60.0));
        assert!(!should_jump(&snapshot(200.0, false), 60.0));
        assert!(!should_jump(&snapshot(90.0, true), 60.0));
        // Already passed.
        assert!(!should_jump(&snapshot(-50.0, false), 60.0));
        assert!(!should_jump(&Snapshot::default(), 60.0));
    }

    #[test]
    fn test_record_line_replays_to_same_snapshot() {
        let recorded = snapshot(90.0, true);
        let lines = [
            record_line(0, &Ok(recorded.clone())),
            record_line(1, &Err(SnapshotError::NullBuffer)),
            record_line(2, &Err(SnapshotError::Decode(DecodeError::NegativeCount(-1)))),
        ];
        assert_eq!(lines[1], "null");
        assert!(lines[2].starts_with("# frame 2:"));

        let frames = parse_frames(&lines.join("\n")).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], encode(&recorded));
        assert!(frames[1].is_empty());
    }
}
