//! Output formatting for the run report

use std::io::{self, IsTerminal, Write};
use std::process::Command;
use std::time::Duration;

use clap::ValueEnum;
use colored::{Color, Colorize};
use serde::Serialize;
use tracing::warn;

use testrig_common::{Hue, RunTotals, StatusKind, TestDetail, TestGroup, VERSION};
use testrig_runner::{Reporter, RunOutcome, TestCase};

/// When to colorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ColorChoice {
    /// Colorize when stdout is a color-capable terminal
    #[default]
    Auto,
    Always,
    Never,
}

/// How much styling the terminal gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    /// Hues and bold
    Color,
    /// Bold only, for terminals with fewer than 8 colors
    Bold,
    Plain,
}

impl Palette {
    /// Resolve the user's choice against the terminal
    pub fn detect(choice: ColorChoice) -> Self {
        let palette = match choice {
            ColorChoice::Always => Palette::Color,
            ColorChoice::Never => Palette::Plain,
            ColorChoice::Auto if cfg!(windows) || !io::stdout().is_terminal() => Palette::Plain,
            ColorChoice::Auto => match terminal_colors() {
                Some(n) if n >= 8 => Palette::Color,
                Some(_) => Palette::Bold,
                None => Palette::Plain,
            },
        };
        // colored checks the environment itself; the choice made here wins
        colored::control::set_override(palette != Palette::Plain);
        palette
    }

    fn paint(self, text: &str, hue: Option<Hue>, bold: bool) -> String {
        match self {
            Palette::Plain => text.to_string(),
            Palette::Bold if bold => text.bold().to_string(),
            Palette::Bold => text.to_string(),
            Palette::Color => {
                let styled = match hue {
                    Some(hue) => text.color(color(hue)),
                    None => text.normal(),
                };
                if bold {
                    styled.bold().to_string()
                } else {
                    styled.to_string()
                }
            }
        }
    }

    pub fn status(self, kind: StatusKind, text: &str) -> String {
        self.paint(text, Some(kind.hue()), kind.is_bold())
    }

    pub fn strong(self, text: &str) -> String {
        self.paint(text, None, true)
    }

    /// Diagnostic lines: detail bodies and `##` notes
    pub fn note(self, text: &str) -> String {
        self.paint(text, Some(Hue::Blue), false)
    }

    pub fn fatal(self) -> String {
        self.paint("FATAL", Some(Hue::Red), true)
    }
}

fn color(hue: Hue) -> Color {
    match hue {
        Hue::Red => Color::Red,
        Hue::Green => Color::Green,
        Hue::Yellow => Color::Yellow,
        Hue::Blue => Color::Blue,
        Hue::Magenta => Color::Magenta,
    }
}

fn terminal_colors() -> Option<u32> {
    let output = Command::new("tput").arg("colors").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

pub fn write_detail(out: &mut dyn Write, palette: Palette, detail: &TestDetail) -> io::Result<()> {
    let label = format!("{:>5}", detail.kind.label());
    writeln!(out, "{}: {}", palette.status(detail.kind, &label), detail.headline())?;
    for line in detail.body() {
        writeln!(out, "  {}", palette.note(line))?;
    }
    Ok(())
}

/// `name: worst-label`
pub fn write_line_summary(out: &mut dyn Write, palette: Palette, group: &TestGroup) -> io::Result<()> {
    let worst = group.worst();
    writeln!(
        out,
        "{}: {}",
        palette.strong(&group.name),
        palette.status(worst, worst.label())
    )
}

/// Line summary followed by the group's details. Unless `show_all`, only
/// FAIL, XPASS and ERROR details are listed.
pub fn write_report(
    out: &mut dyn Write,
    palette: Palette,
    group: &TestGroup,
    show_all: bool,
) -> io::Result<()> {
    write_line_summary(out, palette, group)?;
    let mut shown = false;
    for detail in &group.details {
        if show_all || !detail.kind.is_quiet() {
            write_detail(out, palette, detail)?;
            shown = true;
        }
    }
    if shown {
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_summary(
    out: &mut dyn Write,
    totals: &RunTotals,
    elapsed: Duration,
) -> io::Result<()> {
    writeln!(out, "{:6.3}s elapsed", elapsed.as_secs_f64())?;
    for (kind, n) in totals.nonzero() {
        writeln!(out, " {:>4} {}", n, kind.long_label())?;
    }
    Ok(())
}

/// Progress and final report on a terminal-like stream
pub struct Console<W: Write> {
    out: W,
    palette: Palette,
    verbose: u8,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, palette: Palette, verbose: u8) -> Self {
        Self {
            out,
            palette,
            verbose,
        }
    }

    /// Ends the progress output
    pub fn end_progress(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }

    /// At verbosity 0 the unsuccessful groups are reported in full here,
    /// then the totals
    pub fn finish(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        if self.verbose == 0 {
            for group in outcome.groups.iter().filter(|g| !g.is_successful()) {
                write_report(&mut self.out, self.palette, group, false)?;
            }
        }
        write_summary(&mut self.out, &outcome.totals, outcome.elapsed)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn progress(&mut self, group: &TestGroup) -> io::Result<()> {
        match self.verbose {
            0 => {
                let worst = group.worst();
                write!(self.out, "{}", self.palette.status(worst, worst.short_label()))?;
                self.out.flush()
            }
            1 => write_report(&mut self.out, self.palette, group, false),
            _ => write_report(&mut self.out, self.palette, group, true),
        }
    }
}

impl<W: Write> Reporter for Console<W> {
    fn test_started(&mut self, case: &TestCase) {
        if self.verbose >= 3 {
            let name = self.palette.strong(&case.name);
            if let Err(e) = writeln!(self.out, "{name}:").and_then(|_| self.out.flush()) {
                warn!("failed to write progress: {}", e);
            }
        }
    }

    fn group_finished(&mut self, group: &TestGroup) {
        if let Err(e) = self.progress(group) {
            warn!("failed to write progress: {}", e);
        }
    }
}

/// Machine-readable results written by `--json`
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub target: String,
    pub elapsed_secs: f64,
    pub interrupted: bool,
    pub tests_run: usize,
    pub exit_code: i32,
    pub totals: &'a RunTotals,
    pub groups: &'a [TestGroup],
}

impl<'a> JsonReport<'a> {
    pub fn new(target: impl Into<String>, outcome: &'a RunOutcome) -> Self {
        Self {
            version: VERSION,
            target: target.into(),
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            interrupted: outcome.interrupted,
            tests_run: outcome.tests_run,
            exit_code: outcome.exit_code(),
            totals: &outcome.totals,
            groups: &outcome.groups,
        }
    }
}
