/// Screen content for the tag's status display.
///
/// Screens are rendered as a few short text lines so any sink can show
/// them: a small OLED, a serial console, or a test recorder.
use core::fmt::Write;

use heapless::{String, Vec};

/// Characters per display line
pub const LINE_LEN: usize = 16;

/// Lines per screen
pub const MAX_LINES: usize = 4;

pub type Line = String<LINE_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen<'a> {
    /// No room resolved yet
    Waiting { device_name: &'a str },
    /// Configuration mode with the current settings
    Config {
        device_name: &'a str,
        network_id: u32,
        reporting_interval_s: u16,
    },
    /// Last resolved room
    Room {
        device_name: &'a str,
        room_name: &'a str,
    },
    /// Discovery found no gateways
    Unavailable { device_name: &'a str },
}

impl Screen<'_> {
    pub fn lines(&self) -> Vec<Line, MAX_LINES> {
        let mut out = Vec::new();
        match *self {
            Screen::Waiting { device_name } | Screen::Unavailable { device_name } => {
                push(&mut out, format_args!("{}", device_name));
                push(&mut out, format_args!("Waiting"));
                push(&mut out, format_args!("for"));
                push(&mut out, format_args!("gateways"));
            }
            Screen::Config {
                device_name,
                network_id,
                reporting_interval_s,
            } => {
                push(&mut out, format_args!("{}", device_name));
                push(&mut out, format_args!("UID:{}", network_id));
                push(&mut out, format_args!("int:{}", reporting_interval_s));
            }
            Screen::Room {
                device_name,
                room_name,
            } => {
                push(&mut out, format_args!("{}", device_name));
                push(&mut out, format_args!("Room:"));
                push(&mut out, format_args!("{}", room_name));
            }
        }
        out
    }
}

/// Append one line, cutting it at [`LINE_LEN`] characters.
fn push(out: &mut Vec<Line, MAX_LINES>, args: core::fmt::Arguments<'_>) {
    let mut line = Line::new();
    let mut clip = Clip(&mut line);
    let _ = clip.write_fmt(args);
    let _ = out.push(line);
}

struct Clip<'a>(&'a mut Line);

impl Write for Clip<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}
