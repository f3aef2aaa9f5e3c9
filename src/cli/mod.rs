// Copyright 2024-2026 markprof Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for offline markprof commands.
//!
//! Every command works on files only; none of them attach to a running
//! process.
//!
//! ## Usage
//!
//! ```bash
//! markprof replay marks.bin --tree   # Rebuild trees from a snapshot
//! markprof config show               # Print effective profiler settings
//! markprof config validate p.props   # Report invalid setting lines
//! ```

pub mod config_cmd;
pub mod replay_cmd;

pub use config_cmd::{run_show, run_validate};
pub use replay_cmd::{run_replay, ReplayOptions};

/// Exit code for success.
pub const EXIT_OK: i32 = 0;

/// Exit code for failures and invalid input.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when a snapshot was only partially replayed.
pub const EXIT_PARTIAL: i32 = 2;
