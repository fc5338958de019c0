//! Command implementations.
//!
//! Each submodule handles a specific CLI command.

mod decode;
mod drive;

use dino::{LibraryLoader, ReplayLoader, Snapshot, SnapshotError};
use tracing::error;

use crate::cli::{Cli, Commands, EXIT_FAILURE, OutputFormat};
use crate::terminal;

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Decode { .. } => handle_decode(cli),
        Commands::Replay { .. } => handle_replay(cli),
        Commands::Run { .. } => handle_run(cli),
    }
}

fn handle_decode(cli: &Cli) -> i32 {
    let Commands::Decode {
        frames,
        format,
        limits,
    } = &cli.command
    else {
        unreachable!("decode command variant mismatch");
    };

    decode::cmd_decode(frames, *format, limits.config())
}

fn handle_replay(cli: &Cli) -> i32 {
    let Commands::Replay {
        path,
        drive,
        limits,
    } = &cli.command
    else {
        unreachable!("replay command variant mismatch");
    };

    let loader = match ReplayLoader::from_file(path) {
        Ok(loader) => loader,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to read frames");
            return EXIT_FAILURE;
        }
    };
    terminal::info(&format!(
        "replaying {} frames from {}",
        loader.frame_count(),
        path.display()
    ));
    drive::cmd_drive(loader, drive, limits.config())
}

fn handle_run(cli: &Cli) -> i32 {
    let Commands::Run {
        library,
        drive,
        limits,
    } = &cli.command
    else {
        unreachable!("run command variant mismatch");
    };

    terminal::info(&format!("loading {}", library.display()));
    drive::cmd_drive(LibraryLoader::new(library), drive, limits.config())
}

// ============================================================================
// Output helpers
// ============================================================================

/// Print one frame's decode result.
pub fn print_frame(format: OutputFormat, frame: usize, result: &Result<Snapshot, SnapshotError>) {
    match (format, result) {
        (OutputFormat::Text, Ok(s)) => {
            println!(
                "frame {frame}: actor ({:.1}, {:.1}) {}x{}{}{} speed {:.2} score {} obstacles {}",
                s.actor.x,
                s.actor.y,
                s.actor.width,
                s.actor.height,
                if s.actor.is_airborne { " airborne" } else { "" },
                if s.actor.is_destroyed { " destroyed" } else { "" },
                s.speed,
                s.score,
                s.obstacles.len()
            );
            for o in &s.obstacles {
                println!(
                    "  {} at ({:.1}, {:.1}) {}x{}",
                    o.kind.as_str(),
                    o.x,
                    o.y,
                    o.width,
                    o.height
                );
            }
        }
        (OutputFormat::Text, Err(e)) => println!("frame {frame}: {e}"),
        (OutputFormat::Raw, Ok(s)) => {
            println!(
                "frame={frame} status=ok x={} y={} airborne={} destroyed={} speed={} score={} obstacles={}",
                s.actor.x,
                s.actor.y,
                u8::from(s.actor.is_airborne),
                u8::from(s.actor.is_destroyed),
                s.speed,
                s.score,
                s.obstacles.len()
            );
        }
        (OutputFormat::Raw, Err(e)) => println!("frame={frame} status={}", status(e)),
        (OutputFormat::Json, Ok(s)) => {
            println!("{{\"frame\":{frame},\"status\":\"ok\",\"snapshot\":{}}}", s.to_json());
        }
        (OutputFormat::Json, Err(e)) => {
            println!("{{\"frame\":{frame},\"status\":\"{}\"}}", status(e));
        }
    }
}

/// Short status label for a frame without a snapshot.
const fn status(error: &SnapshotError) -> &'static str {
    match error {
        SnapshotError::NotReady => "not_ready",
        SnapshotError::NullBuffer => "null_buffer",
        SnapshotError::Decode(e) => e.reason(),
    }
}

/// Frame outcome counts for a session summary.
#[derive(Debug, Default)]
pub struct Tally {
    pub decoded: usize,
    pub null: usize,
    pub rejected: usize,
}

impl Tally {
    pub const fn record(&mut self, result: &Result<Snapshot, SnapshotError>) {
        match result {
            Ok(_) => self.decoded += 1,
            Err(SnapshotError::Decode(_)) => self.rejected += 1,
            Err(_) => self.null += 1,
        }
    }

    pub fn report(&self) {
        let line = format!(
            "{} decoded, {} without buffer, {} rejected",
            self.decoded, self.null, self.rejected
        );
        if self.rejected > 0 {
            terminal::warning(&line);
        } else {
            terminal::success(&line);
        }
    }
}
