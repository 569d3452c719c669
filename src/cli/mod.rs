//! Defines BundleMaster's CLI through clap types.

mod generate;
mod inspect;
mod patch;

use std::{
    borrow::Cow,
    env,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::Parser;
use termcolor::{BufferWriter, Color, ColorSpec, WriteColor};
use thiserror::Error;

use crate::settings::{Settings, DEFAULT_SETTINGS_FILE};

pub use self::generate::GenerateCommand;
pub use self::inspect::InspectCommand;
pub use self::patch::PatchCommand;

/// Command line options that BundleMaster accepts, defined using the clap
/// crate.
#[derive(Debug, Parser)]
#[clap(name = "BundleMaster", version, about)]
pub struct Options {
    #[clap(flatten)]
    pub global: GlobalOptions,

    /// Subcommand to run in this invocation.
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

impl Options {
    pub fn run(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Generate(subcommand) => subcommand.run(self.global),
            Subcommand::Patch(subcommand) => subcommand.run(self.global),
            Subcommand::Inspect(subcommand) => subcommand.run(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Sets verbosity level. Can be specified multiple times.
    #[clap(long("verbose"), short, global(true), parse(from_occurrences))]
    pub verbosity: u8,

    /// Set color behavior. Valid values are auto, always, and never.
    #[clap(long("color"), global(true), default_value("auto"))]
    pub color: ColorChoice,

    /// Path to the settings file. Defaults to bundlemaster.settings.json in
    /// the current directory.
    #[clap(long("settings"), global(true))]
    pub settings: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn settings_path(&self) -> anyhow::Result<PathBuf> {
        let path = self
            .settings
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SETTINGS_FILE));

        Ok(resolve_path(path)?.into_owned())
    }

    pub fn load_settings(&self) -> anyhow::Result<(PathBuf, Settings)> {
        let path = self.settings_path()?;
        let settings = Settings::load(&path)?;

        Ok((path, settings))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = ColorChoiceParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(ColorChoiceParseError {
                attempted: source.to_owned(),
            }),
        }
    }
}

impl From<ColorChoice> for termcolor::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => termcolor::ColorChoice::Auto,
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

impl From<ColorChoice> for env_logger::WriteStyle {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => env_logger::WriteStyle::Auto,
            ColorChoice::Always => env_logger::WriteStyle::Always,
            ColorChoice::Never => env_logger::WriteStyle::Never,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid color choice '{attempted}'. Valid values are: auto, always, never")]
pub struct ColorChoiceParseError {
    attempted: String,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    Generate(GenerateCommand),
    Patch(PatchCommand),
    Inspect(InspectCommand),
}

pub(super) fn resolve_path(path: &Path) -> io::Result<Cow<'_, Path>> {
    if path.is_absolute() {
        Ok(Cow::Borrowed(path))
    } else {
        Ok(Cow::Owned(env::current_dir()?.join(path)))
    }
}

/// Saves settings after a command, warning instead of failing.
fn save_settings(path: &Path, settings: &Settings) {
    if let Err(err) = settings.save(path) {
        log::warn!("Could not save settings to {}: {}", path.display(), err);
    }
}

/// Prints a titled list of `label: value` lines, values highlighted.
fn show_summary(
    title: &str,
    lines: &[(&str, String)],
    failed: usize,
    color: termcolor::ColorChoice,
) -> io::Result<()> {
    let writer = BufferWriter::stdout(color);
    let mut buffer = writer.buffer();

    writeln!(&mut buffer, "{}", title)?;

    let width = lines.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

    for (label, value) in lines {
        buffer.set_color(&ColorSpec::new())?;
        write!(&mut buffer, "  {:width$}  ", format!("{}:", label), width = width + 1)?;
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        writeln!(&mut buffer, "{}", value)?;
    }

    if failed > 0 {
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        writeln!(&mut buffer, "  {} file(s) failed, see the log above.", failed)?;
    }

    buffer.set_color(&ColorSpec::new())?;
    writer.print(&buffer)?;

    Ok(())
}
