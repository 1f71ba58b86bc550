//! LDraw line-format parser
//!
//! Splits multi-part documents (`0 FILE` / `0 NOFILE`) into files and
//! parses line types 1-5 plus the `!COLOUR` and `BFC` meta commands.

use glam::{Mat4, Vec3, Vec4};

use super::colours::{parse_code, ColourDef, ColourTable};
use super::LDrawError;

/// Line type 1: a reference to another file
#[derive(Debug, Clone, PartialEq)]
pub struct SubfileRef {
    pub colour: u32,
    pub transform: Mat4,
    /// Normalized name (lowercase, `/` separators)
    pub name: String,
    /// Preceded by `0 BFC INVERTNEXT`
    pub invert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subfile(SubfileRef),
    /// Line types 2 and 5
    Line { colour: u32, points: [Vec3; 2] },
    Triangle { colour: u32, points: [Vec3; 3] },
    Quad { colour: u32, points: [Vec3; 4] },
}

/// One LDraw file, possibly embedded in a multi-part document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LDrawFile {
    pub name: String,
    pub commands: Vec<Command>,
    /// Local `!COLOUR` definitions
    pub colours: Vec<ColourDef>,
    /// Declared `0 BFC CERTIFY CW`
    pub clockwise: bool,
}

impl LDrawFile {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Names of every file this one references
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|command| match command {
            Command::Subfile(reference) => Some(reference.name.as_str()),
            _ => None,
        })
    }
}

/// Lowercase and use forward slashes
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('\\', "/").to_lowercase()
}

/// Text following the first `count` whitespace-separated tokens
fn rest_after(line: &str, count: usize) -> Option<&str> {
    let mut rest = line.trim();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    (!rest.is_empty()).then_some(rest)
}

struct LineParser<'a> {
    number: usize,
    tokens: Vec<&'a str>,
}

impl<'a> LineParser<'a> {
    fn error(&self, message: impl Into<String>) -> LDrawError {
        LDrawError::Parse {
            line: self.number,
            message: message.into(),
        }
    }

    fn colour(&self) -> Result<u32, LDrawError> {
        let token = self.tokens.get(1).copied().unwrap_or_default();
        parse_code(token).ok_or_else(|| self.error(format!("invalid colour {token:?}")))
    }

    fn numbers<const N: usize>(&self, start: usize) -> Result<[f32; N], LDrawError> {
        let mut out = [0.0; N];
        for (i, slot) in out.iter_mut().enumerate() {
            let token = self
                .tokens
                .get(start + i)
                .ok_or_else(|| self.error(format!("expected {} numbers", N)))?;
            *slot = token
                .parse()
                .map_err(|_| self.error(format!("invalid number {token:?}")))?;
        }
        Ok(out)
    }

    fn points<const N: usize>(&self) -> Result<[Vec3; N], LDrawError> {
        let mut points = [Vec3::ZERO; N];
        for (i, point) in points.iter_mut().enumerate() {
            *point = Vec3::from_array(self.numbers::<3>(2 + i * 3)?);
        }
        Ok(points)
    }

    fn subfile(&self, line: &str, invert: bool) -> Result<SubfileRef, LDrawError> {
        let [x, y, z, a, b, c, d, e, f, g, h, i] = self.numbers::<12>(2)?;
        // The file name may contain spaces
        let name = rest_after(line, 14)
            .ok_or_else(|| self.error("subfile reference without a file name"))?;

        Ok(SubfileRef {
            colour: self.colour()?,
            transform: Mat4::from_cols(
                Vec4::new(a, d, g, 0.0),
                Vec4::new(b, e, h, 0.0),
                Vec4::new(c, f, i, 0.0),
                Vec4::new(x, y, z, 1.0),
            ),
            name: normalize_name(name),
            invert,
        })
    }
}

/// Split a document into its files; the first file is the main model
pub fn parse_document(text: &str, default_name: &str) -> Result<Vec<LDrawFile>, LDrawError> {
    let mut files: Vec<LDrawFile> = Vec::new();
    let mut current: Option<LDrawFile> = None;
    let mut invert_next = false;
    let mut seen_file = false;
    let mut local_colours = ColourTable::new();

    for (index, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&kind) = tokens.first() else {
            continue;
        };
        let parser = LineParser {
            number: index + 1,
            tokens,
        };

        if kind == "0" {
            match parser.tokens.get(1).copied() {
                Some("FILE") => {
                    let name = rest_after(line, 2).unwrap_or(default_name);
                    let mut file = LDrawFile::new(normalize_name(name));
                    match current.take() {
                        // Meta lines ahead of the first FILE belong to it
                        Some(preamble) if !seen_file && preamble.commands.is_empty() => {
                            file.colours = preamble.colours;
                            file.clockwise = preamble.clockwise;
                        }
                        previous => files.extend(previous),
                    }
                    current = Some(file);
                    seen_file = true;
                    invert_next = false;
                }
                Some("NOFILE") => {
                    files.extend(current.take());
                    invert_next = false;
                }
                Some("!COLOUR") => {
                    if let Some(colour) = local_colours.parse_line(line, parser.number)? {
                        local_colours.insert(colour.clone());
                        current
                            .get_or_insert_with(|| LDrawFile::new(default_name))
                            .colours
                            .push(colour);
                    }
                }
                Some("BFC") => {
                    let file = current.get_or_insert_with(|| LDrawFile::new(default_name));
                    for token in &parser.tokens[2..] {
                        match *token {
                            "INVERTNEXT" => invert_next = true,
                            "CW" => file.clockwise = true,
                            "CCW" => file.clockwise = false,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        let command = match kind {
            "1" => Command::Subfile(parser.subfile(line, invert_next)?),
            "2" | "5" => Command::Line {
                colour: parser.colour()?,
                points: parser.points::<2>()?,
            },
            "3" => Command::Triangle {
                colour: parser.colour()?,
                points: parser.points::<3>()?,
            },
            "4" => Command::Quad {
                colour: parser.colour()?,
                points: parser.points::<4>()?,
            },
            other => {
                log::warn!("Ignoring unknown LDraw line type {other} on line {}", parser.number);
                continue;
            }
        };
        invert_next = false;

        current
            .get_or_insert_with(|| LDrawFile::new(default_name))
            .commands
            .push(command);
    }

    files.extend(current);
    if files.is_empty() {
        return Err(LDrawError::Empty);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_types() {
        let files = parse_document(
            "0 Simple part\n\
             0 BFC CERTIFY CCW\n\
             2 24 0 0 0 1 0 0\n\
             3 16 0 0 0 1 0 0 0 1 0\n\
             4 4 0 0 0 1 0 0 1 1 0 0 1 0\n\
             5 24 0 0 0 0 1 0 1 0 0 -1 0 0\n",
            "part.dat",
        )
        .unwrap();

        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.name, "part.dat");
        assert!(!file.clockwise);
        assert_eq!(file.commands.len(), 4);
        assert!(matches!(file.commands[2], Command::Quad { colour: 4, .. }));
        assert!(matches!(file.commands[3], Command::Line { colour: 24, .. }));
    }

    #[test]
    fn test_subfile_reference() {
        let files = parse_document(
            "0 BFC INVERTNEXT\n1 4 10 20 30 1 0 0 0 -1 0 0 0 1 S\\My Part.dat\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n",
            "model.ldr",
        )
        .unwrap();

        let Command::Subfile(first) = &files[0].commands[0] else {
            panic!("expected subfile");
        };
        assert_eq!(first.name, "s/my part.dat");
        assert!(first.invert);
        assert_eq!(first.transform.transform_point3(Vec3::ZERO), Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(first.transform.transform_vector3(Vec3::Y), Vec3::new(0.0, -1.0, 0.0));

        let Command::Subfile(second) = &files[0].commands[1] else {
            panic!("expected subfile");
        };
        assert!(!second.invert);
        assert_eq!(files[0].references().collect::<Vec<_>>(), vec!["s/my part.dat", "3001.dat"]);
    }

    #[test]
    fn test_multi_part_document() {
        let files = parse_document(
            "0 FILE Main.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n\
             0 NOFILE\n\
             0 FILE sub.ldr\n\
             0 !COLOUR Custom CODE 500 VALUE #123456 EDGE #000000\n\
             3 500 0 0 0 1 0 0 0 1 0\n",
            "fallback.mpd",
        )
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "main.ldr");
        assert_eq!(files[1].name, "sub.ldr");
        assert_eq!(files[1].colours[0].code, 500);
    }

    #[test]
    fn test_meta_before_first_file_joins_it() {
        let files = parse_document(
            "0 !COLOUR Custom CODE 500 VALUE #123456 EDGE #000000\n\
             0 BFC CERTIFY CW\n\
             0 FILE main.ldr\n\
             3 500 0 0 0 1 0 0 0 1 0\n",
            "doc.mpd",
        )
        .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "main.ldr");
        assert_eq!(files[0].commands.len(), 1);
        assert_eq!(files[0].colours[0].code, 500);
        assert!(files[0].clockwise);
    }

    #[test]
    fn test_empty_first_file_is_kept() {
        let files = parse_document("0 FILE empty.ldr\n0 FILE next.ldr\n3 16 0 0 0 1 0 0 0 1 0\n", "doc.mpd")
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "empty.ldr");
    }

    #[test]
    fn test_invert_next_does_not_cross_files() {
        let files = parse_document(
            "0 FILE a.ldr\n\
             0 BFC INVERTNEXT\n\
             0 NOFILE\n\
             0 FILE b.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 c.dat\n",
            "doc.mpd",
        )
        .unwrap();

        let Command::Subfile(reference) = &files[1].commands[0] else {
            panic!("expected subfile");
        };
        assert!(!reference.invert);
    }

    #[test]
    fn test_bad_lines_fail() {
        assert!(matches!(
            parse_document("3 16 0 0 0 1 0\n", "x.ldr"),
            Err(LDrawError::Parse { line: 1, .. })
        ));
        assert!(parse_document("1 16 0 0 0 1 0 0 0 1 0 0 0 1\n", "x.ldr").is_err());
        assert!(matches!(parse_document("\n\n", "x.ldr"), Err(LDrawError::Empty)));
    }
}
