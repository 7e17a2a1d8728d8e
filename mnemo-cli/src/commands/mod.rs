//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

use {
    crate::{Cli, use_fancy_output},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
};

pub(crate) mod decode;
pub(crate) mod import;
pub(crate) mod ports;
pub(crate) mod update;

/// Progress bar on stderr, hidden in quiet mode or without a terminal.
pub(crate) fn progress_bar(cli: &Cli, len: u64, template: &str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    #[allow(clippy::unwrap_used)] // Static template strings
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}
