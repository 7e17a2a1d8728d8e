//! Survey import command.

use {
    super::progress_bar,
    crate::{Cli, config::Config, resolve_port},
    anyhow::{Context, Result},
    console::style,
    mnemo::{
        AcquisitionConfig, DumpFormat, DumpWriter, NativePort, ProtocolVersion, SerialChannel,
        SurveySink,
        survey::{self, acquire::IMPORT_BAUD},
    },
    std::{fs::File, path::Path},
};

/// Import command implementation.
pub(crate) fn cmd_import(
    cli: &Cli,
    config: &Config,
    tty: Option<&str>,
    output: &Path,
    format: DumpFormat,
    protocol: ProtocolVersion,
) -> Result<()> {
    let port = resolve_port(cli, config, tty)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} ({protocol} protocol)",
            style("🔌").cyan(),
            port
        );
    }

    let serial = NativePort::open_simple(&port, IMPORT_BAUD)?;
    let mut channel = SerialChannel::open(serial, IMPORT_BAUD)?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = DumpWriter::new(file, format);

    let pb = progress_bar(cli, 0, "{spinner:.green} [{elapsed_precise}] {msg}");
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_message("Waiting for data");

    let mut sink = |chunk: &[u8]| -> mnemo::Result<()> {
        writer.on_data(chunk)?;
        pb.set_message(format!("{} bytes received", writer.bytes_written()));
        Ok(())
    };
    let result = survey::acquire(
        &mut channel,
        protocol,
        &mut sink,
        &AcquisitionConfig::default(),
    );

    let total = match result {
        Ok(total) => total,
        Err(e) => {
            pb.abandon();
            return Err(e).context("Survey import failed");
        },
    };
    pb.finish_and_clear();

    writer
        .into_inner()
        .with_context(|| format!("Failed to write {}", output.display()))?;
    channel.close()?;

    if !cli.quiet {
        if total == 0 {
            eprintln!(
                "{} No data received; is the logger connected and on its main screen?",
                style("⚠").yellow()
            );
        } else {
            eprintln!(
                "{} Imported {total} bytes to {} ({format})",
                style("✓").green(),
                output.display()
            );
        }
    }

    Ok(())
}
