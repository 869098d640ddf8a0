//! The textual script DSL: rendering commands to text and parsing text back.
//!
//! One statement per line; blank lines and lines whose first non-blank
//! character is `#` are ignored.  Recognized statements:
//!
//! ```text
//! move(x,y)                  absolute cursor move, non-negative
//! move_rel(dx,dy)            relative cursor move, signed
//! mouse_down('left')         button press ('left'|'right'|'middle')
//! mouse_release('left')      button release
//! mouse_click('left')        combined press-and-release
//! type_text('hello \'x\'')   typed text, backslash-escaped single quotes
//! key_down('a')              single key press (char or raw key name)
//! key_release('a')           single key release
//! sleep(seconds)             non-negative, fractional allowed
//! msleep(milliseconds)       non-negative
//! ```
//!
//! Rendering and parsing are symmetric: a rendered command list re-parses
//! into type/parameter-equivalent commands.  Durations are exported as
//! `msleep` rounded to the nearest millisecond, away from zero.  A
//! command's own inter-command delay is rendered as a preceding `msleep`
//! statement when nonzero.

use std::fmt::Write as _;
use std::time::Duration;

use thiserror::Error;

use crate::command::{ClickType, Command, CommandKind, MouseButton};
use crate::keys::KeyName;

/// Error raised by [`parse_script`] for a malformed line.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {message}")]
pub struct DslError {
    /// 1-based line number of the offending statement.
    pub line: usize,
    pub message: String,
}

impl DslError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Renders a command list into DSL text, one statement per line.
///
/// Nonzero inter-command delays become `msleep` statements so the rendered
/// script replays with the recorded timing.
pub fn render_commands(commands: &[Command]) -> String {
    let mut out = String::new();
    for command in commands {
        let delay_ms = round_millis(command.delay);
        if delay_ms > 0 {
            let _ = writeln!(out, "msleep({delay_ms})");
        }
        let _ = writeln!(out, "{}", render_kind(&command.kind));
    }
    out
}

fn render_kind(kind: &CommandKind) -> String {
    match kind {
        CommandKind::MouseMove { x, y } => format!("move({x},{y})"),
        CommandKind::MouseMoveRelative { dx, dy } => format!("move_rel({dx},{dy})"),
        CommandKind::MouseClick { button, click } => {
            let call = match click {
                ClickType::Press => "mouse_down",
                ClickType::Release => "mouse_release",
                ClickType::Click => "mouse_click",
            };
            format!("{call}('{}')", button.dsl_name())
        }
        CommandKind::Keyboard { text } => format!("type_text('{}')", escape(text)),
        CommandKind::KeyPress { key, is_down } => {
            let call = if *is_down { "key_down" } else { "key_release" };
            format!("{call}('{}')", escape(key.as_str()))
        }
        CommandKind::Sleep { duration } => format!("msleep({})", round_millis(*duration)),
    }
}

/// Rounds a duration to whole milliseconds, half away from zero.
fn round_millis(duration: Duration) -> u64 {
    (duration.as_secs_f64() * 1000.0).round() as u64
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// One parsed argument of a DSL statement.
#[derive(Debug, PartialEq)]
enum Arg {
    Number(f64),
    Text(String),
}

/// Parses DSL text into a command list.
///
/// Every parsed command has zero delay; timing is carried by explicit
/// `Sleep` commands, mirroring what [`render_commands`] emits.
///
/// # Errors
///
/// Returns a line-numbered [`DslError`] for the first malformed line.
pub fn parse_script(source: &str) -> Result<Vec<Command>, DslError> {
    let mut commands = Vec::new();
    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        commands.push(Command::immediate(parse_statement(line, line_no)?));
    }
    Ok(commands)
}

fn parse_statement(line: &str, line_no: usize) -> Result<CommandKind, DslError> {
    let open = line
        .find('(')
        .ok_or_else(|| DslError::new(line_no, "expected a call like name(args)"))?;
    if !line.ends_with(')') {
        return Err(DslError::new(line_no, "missing closing ')'"));
    }
    let name = line[..open].trim();
    let args = parse_args(&line[open + 1..line.len() - 1], line_no)?;

    match name {
        "move" => {
            let (x, y) = two_numbers(&args, name, line_no)?;
            let x = non_negative_coord(x, line_no)?;
            let y = non_negative_coord(y, line_no)?;
            Ok(CommandKind::MouseMove { x, y })
        }
        "move_rel" => {
            let (dx, dy) = two_numbers(&args, name, line_no)?;
            Ok(CommandKind::MouseMoveRelative {
                dx: dx as i32,
                dy: dy as i32,
            })
        }
        "mouse_down" | "mouse_release" | "mouse_click" => {
            let button_name = one_text(&args, name, line_no)?;
            let button = MouseButton::from_dsl_name(&button_name).ok_or_else(|| {
                DslError::new(line_no, format!("unknown mouse button '{button_name}'"))
            })?;
            let click = match name {
                "mouse_down" => ClickType::Press,
                "mouse_release" => ClickType::Release,
                _ => ClickType::Click,
            };
            Ok(CommandKind::MouseClick { button, click })
        }
        "type_text" => {
            let text = one_text(&args, name, line_no)?;
            Ok(CommandKind::Keyboard { text })
        }
        "key_down" | "key_release" => {
            let spelling = one_text(&args, name, line_no)?;
            if spelling.is_empty() {
                return Err(DslError::new(line_no, "empty key name"));
            }
            Ok(CommandKind::KeyPress {
                key: KeyName::parse(&spelling),
                is_down: name == "key_down",
            })
        }
        "sleep" => {
            let seconds = one_number(&args, name, line_no)?;
            Ok(CommandKind::Sleep {
                duration: duration_from(seconds, 1000.0, line_no)?,
            })
        }
        "msleep" => {
            let millis = one_number(&args, name, line_no)?;
            Ok(CommandKind::Sleep {
                duration: duration_from(millis, 1.0, line_no)?,
            })
        }
        other => Err(DslError::new(line_no, format!("unknown statement '{other}'"))),
    }
}

/// Converts a DSL duration argument to a [`Duration`] in whole milliseconds.
fn duration_from(value: f64, millis_per_unit: f64, line_no: usize) -> Result<Duration, DslError> {
    if value < 0.0 || !value.is_finite() {
        return Err(DslError::new(line_no, "duration must be non-negative"));
    }
    Ok(Duration::from_millis((value * millis_per_unit).round() as u64))
}

fn non_negative_coord(value: f64, line_no: usize) -> Result<u32, DslError> {
    if value < 0.0 {
        return Err(DslError::new(line_no, "coordinates must be non-negative"));
    }
    Ok(value as u32)
}

fn two_numbers(args: &[Arg], name: &str, line_no: usize) -> Result<(f64, f64), DslError> {
    match args {
        [Arg::Number(a), Arg::Number(b)] => Ok((*a, *b)),
        _ => Err(DslError::new(
            line_no,
            format!("{name} expects two numeric arguments"),
        )),
    }
}

fn one_number(args: &[Arg], name: &str, line_no: usize) -> Result<f64, DslError> {
    match args {
        [Arg::Number(a)] => Ok(*a),
        _ => Err(DslError::new(
            line_no,
            format!("{name} expects one numeric argument"),
        )),
    }
}

fn one_text(args: &[Arg], name: &str, line_no: usize) -> Result<String, DslError> {
    match args {
        [Arg::Text(s)] => Ok(s.clone()),
        _ => Err(DslError::new(
            line_no,
            format!("{name} expects one quoted string argument"),
        )),
    }
}

/// Splits an argument list on commas, honouring single-quoted strings with
/// `\'` and `\\` escapes.
fn parse_args(text: &str, line_no: usize) -> Result<Vec<Arg>, DslError> {
    let mut args = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.peek() {
            None => break,
            Some('\'') => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('\'') => value.push('\''),
                            Some('\\') => value.push('\\'),
                            Some(other) => {
                                value.push('\\');
                                value.push(other);
                            }
                            None => {
                                return Err(DslError::new(line_no, "unterminated string"));
                            }
                        },
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => return Err(DslError::new(line_no, "unterminated string")),
                    }
                }
                args.push(Arg::Text(value));
            }
            Some(_) => {
                let mut token = String::new();
                while matches!(chars.peek(), Some(c) if *c != ',') {
                    token.push(chars.next().ok_or_else(|| {
                        DslError::new(line_no, "unexpected end of arguments")
                    })?);
                }
                let token = token.trim();
                let value: f64 = token.parse().map_err(|_| {
                    DslError::new(line_no, format!("expected a number, got '{token}'"))
                })?;
                args.push(Arg::Number(value));
            }
        }
        // Consume the separator (or finish).
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => {
                return Err(DslError::new(
                    line_no,
                    format!("unexpected character '{c}' in argument list"),
                ));
            }
        }
    }
    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
