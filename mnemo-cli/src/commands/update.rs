//! Firmware update command.

use {
    super::progress_bar,
    crate::{Cli, config::Config, resolve_port},
    anyhow::{Context, Result},
    console::style,
    log::debug,
    mnemo::{
        BootloaderClient, FlashOrchestrator, FlashPhase, HexDecoder, HexDiagnostic, NativePort,
        SerialChannel,
    },
    std::{fs::File, io::BufReader, path::Path},
};

/// Whether `path` looks like an Intel HEX file.
fn has_hex_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex"))
}

/// Update command implementation.
pub(crate) fn cmd_update(
    cli: &Cli,
    config: &Config,
    tty: Option<&str>,
    firmware: &Path,
    baud: u32,
) -> Result<()> {
    if !has_hex_extension(firmware) && !cli.quiet {
        eprintln!(
            "{} {} does not have a .hex extension",
            style("⚠").yellow(),
            firmware.display()
        );
    }

    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let file = File::open(firmware)
        .with_context(|| format!("Failed to open firmware {}", firmware.display()))?;
    let mut skipped = 0usize;
    let mut dropped = 0usize;
    let (mut image, written) = HexDecoder::new()
        .decode_with(BufReader::new(file), |diagnostic| {
            debug!("{diagnostic:?}");
            match diagnostic {
                HexDiagnostic::Skipped { .. } => skipped += 1,
                HexDiagnostic::OutOfRange { dropped: n, .. } => dropped += n,
            }
        })
        .with_context(|| format!("Failed to read firmware {}", firmware.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {written} bytes decoded, highest address 0x{:05X}",
            style("ℹ").blue(),
            image.highest_written_address()
        );
        if skipped > 0 {
            eprintln!(
                "{} {skipped} malformed lines skipped",
                style("⚠").yellow()
            );
        }
        if dropped > 0 {
            eprintln!(
                "{} {dropped} bytes outside the image dropped",
                style("⚠").yellow()
            );
        }
    }

    let port = resolve_port(cli, config, tty)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            port,
            baud
        );
    }

    let serial = NativePort::open_simple(&port, baud)?;
    let channel = SerialChannel::open(serial, baud)?;
    let mut flasher = FlashOrchestrator::new(BootloaderClient::new(channel));

    let pb = progress_bar(
        cli,
        100,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
    );
    let mut current_phase = None;

    let result = flasher.run(&mut image, |progress| {
        if current_phase != Some(progress.phase) {
            current_phase = Some(progress.phase);
            pb.set_message(match progress.phase {
                FlashPhase::Write => "Writing",
                FlashPhase::Verify => "Verifying",
                _ => "",
            });
            pb.set_position(0);
        }
        pb.set_position(u64::from(progress.percent));
    });

    let info = match result {
        Ok(info) => {
            pb.finish_with_message("Complete");
            info
        },
        Err(e) => {
            pb.abandon();
            return Err(e).context("Firmware update failed");
        },
    };

    let channel = flasher.into_client().into_channel();
    channel.close()?;

    if !cli.quiet {
        eprintln!(
            "{} Bootloader v{}.{} (device 0x{:04X})",
            style("ℹ").blue(),
            info.version >> 8,
            info.version & 0xFF,
            info.device_id
        );
        eprintln!(
            "\n{} {}",
            style("🎉").green().bold(),
            "Firmware update complete"
        );
    }

    Ok(())
}
