//! Decode command.

use std::path::Path;

use dino::{Bridge, BridgeConfig, ReplayLoader, parse_frames};
use futures::executor::block_on;
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, OutputFormat};
use crate::commands::{Tally, print_frame};

/// Handle the `decode` command.
///
/// Every frame is hosted by its own replay bridge, so a frame that ends
/// playback does not hide the frames after it.
pub fn cmd_decode(path: &Path, format: OutputFormat, config: BridgeConfig) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to read frames");
            return EXIT_FAILURE;
        }
    };
    let frames = match parse_frames(&text) {
        Ok(frames) => frames,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to parse frames");
            return EXIT_FAILURE;
        }
    };

    let mut tally = Tally::default();
    for (index, frame) in frames.into_iter().enumerate() {
        let bridge = Bridge::new(ReplayLoader::new(vec![frame]), config);
        if !block_on(bridge.init()) {
            return EXIT_FAILURE;
        }
        let result = bridge.try_snapshot();
        tally.record(&result);
        print_frame(format, index, &result);
        bridge.shutdown();
    }

    tally.report();
    EXIT_SUCCESS
}
