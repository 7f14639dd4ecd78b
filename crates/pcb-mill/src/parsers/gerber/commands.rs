//! Token stream → structured Gerber commands.
//!
//! Coordinates stay as raw digit strings here: they cannot be decoded until
//! the interpreter knows the active `%FS` format and zero-suppression mode.

use crate::error::MillError;
use crate::parsers::coord::{CoordMode, FixedFormat, ZeroSuppression};

use super::lexer::{Token, TokenKind};

/// Unit mode from `%MO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    pub fn scale(self) -> f64 {
        match self {
            Units::Millimeters => 1.0,
            Units::Inches => 25.4,
        }
    }
}

/// Image polarity from `%LP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Dark,
    Clear,
}

/// Full `%FS` declaration: zero suppression, coordinate mode, X/Y layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatSpec {
    pub mode: CoordMode,
    pub x: FixedFormat,
    pub y: FixedFormat,
}

impl Default for FormatSpec {
    fn default() -> Self {
        // Defaulting per the historical convention: leading-zero
        // suppression, absolute coordinates, 3 integer / 6 decimal digits.
        Self {
            mode: CoordMode::Absolute,
            x: FixedFormat::new(3, 6, ZeroSuppression::Leading),
            y: FixedFormat::new(3, 6, ZeroSuppression::Leading),
        }
    }
}

/// Aperture shape from `%AD`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApertureTemplate {
    Circle { diameter: f64 },
    Rect { w: f64, h: f64 },
    Oblong { w: f64, h: f64 },
    Macro { name: String, params: Vec<f64> },
}

/// One structured Gerber command with its source line.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberCommand {
    FormatSpec(FormatSpec),
    Units(Units),
    ApertureDefine {
        code: u32,
        template: ApertureTemplate,
    },
    MacroDefine {
        name: String,
        body: Vec<String>,
    },
    SelectAperture(u32),
    /// D01 — draw to (x, y); missing fields are modal.
    Draw {
        x: Option<String>,
        y: Option<String>,
    },
    /// D02 — move to (x, y).
    Move {
        x: Option<String>,
        y: Option<String>,
    },
    /// D03 — flash at (x, y).
    Flash {
        x: Option<String>,
        y: Option<String>,
    },
    RegionBegin,
    RegionEnd,
    /// G02/G03 — circular interpolation, which this pipeline does not cut.
    ArcMode,
    Polarity(Polarity),
    EndOfFile,
}

/// Parse the token stream, attaching each command to its source line.
pub fn parse_commands(
    tokens: &[Token],
    file: &str,
) -> Result<Vec<(GerberCommand, usize)>, MillError> {
    let mut commands = Vec::new();
    let mut open_macro: Option<(String, Vec<String>, usize)> = None;

    for token in tokens {
        match &token.kind {
            TokenKind::Extended(content) => {
                if let Some(name) = content.strip_prefix("AM") {
                    // New macro header; flush any previous definition.
                    if let Some((name, body, line)) = open_macro.take() {
                        commands.push((GerberCommand::MacroDefine { name, body }, line));
                    }
                    if !name.is_empty() {
                        open_macro = Some((name.to_string(), Vec::new(), token.line));
                    }
                    continue;
                }

                // Statements starting with a digit or '$' inside an open %AM
                // block are macro body primitives.
                if let Some((_, body, _)) = open_macro.as_mut() {
                    if content.starts_with(|c: char| c.is_ascii_digit() || c == '$') {
                        body.push(content.clone());
                        continue;
                    }
                    let (name, body, line) = open_macro.take().unwrap();
                    commands.push((GerberCommand::MacroDefine { name, body }, line));
                }

                if let Some(cmd) = parse_extended(content, file, token.line)? {
                    commands.push((cmd, token.line));
                }
            }
            TokenKind::Word(word) => {
                if let Some((name, body, line)) = open_macro.take() {
                    commands.push((GerberCommand::MacroDefine { name, body }, line));
                }
                for cmd in parse_word(word, file, token.line)? {
                    commands.push((cmd, token.line));
                }
            }
        }
    }

    if let Some((name, body, line)) = open_macro.take() {
        commands.push((GerberCommand::MacroDefine { name, body }, line));
    }

    Ok(commands)
}

fn parse_extended(
    content: &str,
    file: &str,
    line: usize,
) -> Result<Option<GerberCommand>, MillError> {
    if content.starts_with("FS") {
        return Ok(Some(GerberCommand::FormatSpec(parse_format_spec(
            content, file, line,
        )?)));
    }
    if content == "MOMM" {
        return Ok(Some(GerberCommand::Units(Units::Millimeters)));
    }
    if content == "MOIN" {
        return Ok(Some(GerberCommand::Units(Units::Inches)));
    }
    if content.starts_with("AD") {
        return Ok(Some(parse_aperture_define(content, file, line)?));
    }
    if content.eq_ignore_ascii_case("LPD") {
        return Ok(Some(GerberCommand::Polarity(Polarity::Dark)));
    }
    if content.eq_ignore_ascii_case("LPC") {
        return Ok(Some(GerberCommand::Polarity(Polarity::Clear)));
    }
    // Other extended statements (TF/TA/TD attributes, IP, SR, ...) are
    // outside this pipeline's scope.
    Ok(None)
}

/// Parse `%FS`, e.g. `FSLAX36Y36`: zero mode, coordinate mode, digit layouts.
fn parse_format_spec(content: &str, file: &str, line: usize) -> Result<FormatSpec, MillError> {
    let body = &content[2..];

    // Layout: FS <L|T> <A|I> X<i><d> Y<i><d>; either flag may be omitted in
    // sloppy files, in which case the defaults (L, A) hold.
    let zero = match body.chars().next() {
        Some('T') => ZeroSuppression::Trailing,
        _ => ZeroSuppression::Leading,
    };
    let mode = match body.chars().nth(1) {
        Some('I') => CoordMode::Incremental,
        _ => CoordMode::Absolute,
    };

    let x_pos = body
        .find('X')
        .ok_or_else(|| MillError::parse(file, line, "FS: missing X format"))?;
    let y_pos = body
        .find('Y')
        .ok_or_else(|| MillError::parse(file, line, "FS: missing Y format"))?;

    let x_part = &body[x_pos + 1..y_pos];
    let y_part = &body[y_pos + 1..];

    let digits = |part: &str| -> Result<(u8, u8), MillError> {
        let mut it = part.chars().filter_map(|c| c.to_digit(10));
        match (it.next(), it.next()) {
            (Some(i), Some(d)) => Ok((i as u8, d as u8)),
            _ => Err(MillError::parse(
                file,
                line,
                format!("FS: bad digit layout: {part}"),
            )),
        }
    };

    let (xi, xd) = digits(x_part)?;
    let (yi, yd) = digits(y_part)?;

    Ok(FormatSpec {
        mode,
        x: FixedFormat::new(xi, xd, zero),
        y: FixedFormat::new(yi, yd, zero),
    })
}

/// Parse `%AD`, standard (`ADD10C,0.25` / `ADD11R,1.2X0.8`) or macro
/// (`ADD12RECT21,1.0X0.5X45`) form.
fn parse_aperture_define(content: &str, file: &str, line: usize) -> Result<GerberCommand, MillError> {
    let body = content
        .strip_prefix("ADD")
        .ok_or_else(|| MillError::parse(file, line, format!("AD: expected ADD..: {content}")))?;

    let name_start = body
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| MillError::parse(file, line, format!("AD: no shape name: {content}")))?;
    let code: u32 = body[..name_start]
        .parse()
        .map_err(|_| MillError::parse(file, line, format!("AD: bad aperture id: {content}")))?;

    let rest = &body[name_start..];
    let (name, params_str) = match rest.find(',') {
        Some(comma) => (&rest[..comma], &rest[comma + 1..]),
        None => (rest, ""),
    };

    let params: Vec<f64> = if params_str.is_empty() {
        Vec::new()
    } else {
        params_str
            .split('X')
            .map(|p| {
                p.trim().parse::<f64>().map_err(|_| {
                    MillError::parse(file, line, format!("AD: bad parameter '{p}' in {content}"))
                })
            })
            .collect::<Result<_, _>>()?
    };

    let template = match name {
        "C" => ApertureTemplate::Circle {
            diameter: *params
                .first()
                .ok_or_else(|| MillError::parse(file, line, "AD C: missing diameter"))?,
        },
        "R" => {
            let w = *params
                .first()
                .ok_or_else(|| MillError::parse(file, line, "AD R: missing width"))?;
            let h = params.get(1).copied().unwrap_or(w);
            ApertureTemplate::Rect { w, h }
        }
        "O" => {
            let w = *params
                .first()
                .ok_or_else(|| MillError::parse(file, line, "AD O: missing width"))?;
            let h = params.get(1).copied().unwrap_or(w);
            ApertureTemplate::Oblong { w, h }
        }
        _ => ApertureTemplate::Macro {
            name: name.to_string(),
            params,
        },
    };

    Ok(GerberCommand::ApertureDefine { code, template })
}

/// Parse a word command. One word can yield several commands
/// (`G01X100Y200D01` is a mode change plus a draw).
fn parse_word(word: &str, file: &str, line: usize) -> Result<Vec<GerberCommand>, MillError> {
    let mut out = Vec::new();
    let mut rest = word;

    // Leading G codes.
    while rest.starts_with('G') {
        let digits: String = rest[1..].chars().take_while(|c| c.is_ascii_digit()).collect();
        let code: u32 = digits
            .parse()
            .map_err(|_| MillError::parse(file, line, format!("bad G code: {word}")))?;
        rest = &rest[1 + digits.len()..];
        match code {
            1 => {} // linear interpolation: the only mode this pipeline cuts
            2 | 3 => out.push(GerberCommand::ArcMode),
            36 => out.push(GerberCommand::RegionBegin),
            37 => out.push(GerberCommand::RegionEnd),
            54 | 55 => {} // legacy select/flash prefix; the D word follows
            70 | 71 | 74 | 75 | 90 | 91 => {} // legacy units/quadrant/coord modes
            _ => {}
        }
    }

    if rest.is_empty() {
        return Ok(out);
    }

    if rest == "M02" || rest == "M2" || rest == "M00" {
        out.push(GerberCommand::EndOfFile);
        return Ok(out);
    }
    if rest.starts_with('M') {
        return Ok(out);
    }

    // Bare aperture select: D10, D11, ...
    if let Some(dnum) = rest.strip_prefix('D') {
        let code: u32 = dnum
            .parse()
            .map_err(|_| MillError::parse(file, line, format!("bad D code: {word}")))?;
        if code >= 10 {
            out.push(GerberCommand::SelectAperture(code));
        }
        return Ok(out);
    }

    // Coordinate word: X..Y..[I..J..]D01|D02|D03
    let mut x = None;
    let mut y = None;
    let mut op: Option<u32> = None;

    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let field = bytes[i] as char;
        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && !(bytes[end] as char).is_ascii_alphabetic() {
            end += 1;
        }
        let value = &rest[start..end];
        match field {
            'X' => x = Some(value.to_string()),
            'Y' => y = Some(value.to_string()),
            'I' | 'J' => {} // arc offsets, not interpolated here
            'D' => {
                op = value.parse::<u32>().ok();
            }
            _ => {
                return Err(MillError::parse(
                    file,
                    line,
                    format!("unrecognized field '{field}' in {word}"),
                ));
            }
        }
        i = end;
    }

    match op {
        Some(1) => out.push(GerberCommand::Draw { x, y }),
        Some(2) => out.push(GerberCommand::Move { x, y }),
        Some(3) => out.push(GerberCommand::Flash { x, y }),
        Some(code) if code >= 10 => out.push(GerberCommand::SelectAperture(code)),
        Some(_) | None => {
            // A bare coordinate word repeats the previous operation in old
            // files; without that context, drop it.
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::gerber::lexer::tokenize;

    fn parse(input: &str) -> Vec<GerberCommand> {
        parse_commands(&tokenize(input), "test.gbr")
            .unwrap()
            .into_iter()
            .map(|(c, _)| c)
            .collect()
    }

    #[test]
    fn test_format_spec_leading_absolute() {
        let cmds = parse("%FSLAX36Y36*%\n");
        let GerberCommand::FormatSpec(fs) = &cmds[0] else {
            panic!("expected FormatSpec");
        };
        assert_eq!(fs.mode, CoordMode::Absolute);
        assert_eq!(fs.x.integer, 3);
        assert_eq!(fs.x.decimal, 6);
        assert_eq!(fs.x.zero, ZeroSuppression::Leading);
    }

    #[test]
    fn test_format_spec_trailing_incremental() {
        let cmds = parse("%FSTIX24Y24*%\n");
        let GerberCommand::FormatSpec(fs) = &cmds[0] else {
            panic!("expected FormatSpec");
        };
        assert_eq!(fs.mode, CoordMode::Incremental);
        assert_eq!(fs.x.zero, ZeroSuppression::Trailing);
    }

    #[test]
    fn test_units() {
        assert_eq!(parse("%MOMM*%"), vec![GerberCommand::Units(Units::Millimeters)]);
        assert_eq!(parse("%MOIN*%"), vec![GerberCommand::Units(Units::Inches)]);
    }

    #[test]
    fn test_aperture_circle() {
        let cmds = parse("%ADD10C,0.25*%");
        assert_eq!(
            cmds[0],
            GerberCommand::ApertureDefine {
                code: 10,
                template: ApertureTemplate::Circle { diameter: 0.25 },
            }
        );
    }

    #[test]
    fn test_aperture_rect_and_oblong() {
        let cmds = parse("%ADD11R,1.2X0.8*%\n%ADD12O,2.0X1.0*%");
        assert_eq!(
            cmds[0],
            GerberCommand::ApertureDefine {
                code: 11,
                template: ApertureTemplate::Rect { w: 1.2, h: 0.8 },
            }
        );
        assert_eq!(
            cmds[1],
            GerberCommand::ApertureDefine {
                code: 12,
                template: ApertureTemplate::Oblong { w: 2.0, h: 1.0 },
            }
        );
    }

    #[test]
    fn test_aperture_macro_reference() {
        let cmds = parse("%ADD13RECT21,1.5X0.5X45*%");
        assert_eq!(
            cmds[0],
            GerberCommand::ApertureDefine {
                code: 13,
                template: ApertureTemplate::Macro {
                    name: "RECT21".into(),
                    params: vec![1.5, 0.5, 45.0],
                },
            }
        );
    }

    #[test]
    fn test_macro_definition_collects_body() {
        let cmds = parse("%AMRECT21*\n21,1,$1,$2,0,0,$3*%\n%ADD10RECT21,1.0X0.5X0*%");
        assert_eq!(
            cmds[0],
            GerberCommand::MacroDefine {
                name: "RECT21".into(),
                body: vec!["21,1,$1,$2,0,0,$3".into()],
            }
        );
        assert!(matches!(cmds[1], GerberCommand::ApertureDefine { .. }));
    }

    #[test]
    fn test_operations() {
        let cmds = parse("D10*\nX100Y200D02*\nX300Y200D01*\nX5Y5D03*\nM02*\n");
        assert_eq!(cmds[0], GerberCommand::SelectAperture(10));
        assert_eq!(
            cmds[1],
            GerberCommand::Move {
                x: Some("100".into()),
                y: Some("200".into()),
            }
        );
        assert_eq!(
            cmds[2],
            GerberCommand::Draw {
                x: Some("300".into()),
                y: Some("200".into()),
            }
        );
        assert_eq!(
            cmds[3],
            GerberCommand::Flash {
                x: Some("5".into()),
                y: Some("5".into()),
            }
        );
        assert_eq!(cmds[4], GerberCommand::EndOfFile);
    }

    #[test]
    fn test_modal_coordinates() {
        let cmds = parse("Y200D01*\n");
        assert_eq!(
            cmds[0],
            GerberCommand::Draw {
                x: None,
                y: Some("200".into()),
            }
        );
    }

    #[test]
    fn test_region_markers_and_polarity() {
        let cmds = parse("G36*\n%LPC*%\nG37*\n");
        assert_eq!(cmds[0], GerberCommand::RegionBegin);
        assert_eq!(cmds[1], GerberCommand::Polarity(Polarity::Clear));
        assert_eq!(cmds[2], GerberCommand::RegionEnd);
    }

    #[test]
    fn test_combined_g_and_coordinate_word() {
        let cmds = parse("G01X100Y200D01*\n");
        assert_eq!(
            cmds[0],
            GerberCommand::Draw {
                x: Some("100".into()),
                y: Some("200".into()),
            }
        );
    }

    #[test]
    fn test_arc_mode_flagged() {
        let cmds = parse("G02X100Y200D01*\n");
        assert_eq!(cmds[0], GerberCommand::ArcMode);
        assert!(matches!(cmds[1], GerberCommand::Draw { .. }));
    }

    #[test]
    fn test_negative_coordinates() {
        let cmds = parse("X-100Y-200D02*\n");
        assert_eq!(
            cmds[0],
            GerberCommand::Move {
                x: Some("-100".into()),
                y: Some("-200".into()),
            }
        );
    }
}
