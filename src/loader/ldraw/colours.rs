//! LDraw colour definitions (`0 !COLOUR` meta commands)

use std::collections::HashMap;

use crate::material::{Color, MaterialDescriptor, MaterialKind, MaterialProperty, PropertyValue};

use super::LDrawError;

/// Colour code that inherits the parent's main colour
pub const MAIN_COLOUR: u32 = 16;
/// Colour code that inherits the parent's edge colour
pub const EDGE_COLOUR: u32 = 24;

const DIRECT_COLOUR_MIN: u32 = 0x200_0000;
const DIRECT_COLOUR_MAX: u32 = 0x2FF_FFFF;

/// Surface finish keyword of a colour definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finish {
    #[default]
    Plastic,
    Chrome,
    Pearlescent,
    Rubber,
    MatteMetallic,
    Metal,
}

impl Finish {
    /// `(roughness, metalness)` of the finish
    pub fn surface(self) -> (f32, f32) {
        match self {
            Finish::Plastic => (0.3, 0.0),
            Finish::Chrome => (0.0, 1.0),
            Finish::Pearlescent => (0.3, 0.25),
            Finish::Rubber => (0.9, 0.0),
            Finish::MatteMetallic => (0.8, 0.4),
            Finish::Metal => (0.2, 0.85),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColourDef {
    pub code: u32,
    pub name: String,
    pub value: Color,
    pub edge: Color,
    /// 0..=1
    pub alpha: f32,
    /// 0..=1
    pub luminance: f32,
    pub finish: Finish,
}

impl ColourDef {
    /// Colour for a direct `0x2RRGGBB` code
    pub fn direct(code: u32) -> Option<Self> {
        if !(DIRECT_COLOUR_MIN..=DIRECT_COLOUR_MAX).contains(&code) {
            return None;
        }
        let value = Color::from_hex(code & 0xFF_FFFF);
        Some(Self {
            code,
            name: format!("direct_{:06X}", code & 0xFF_FFFF),
            value,
            edge: Color::BLACK,
            alpha: 1.0,
            luminance: 0.0,
            finish: Finish::Plastic,
        })
    }

    /// Light grey used when a code has no definition
    pub fn missing(code: u32) -> Self {
        Self {
            code,
            name: format!("missing_{code}"),
            value: Color::from_hex(0xA0A5A9),
            edge: Color::from_hex(0x333333),
            alpha: 1.0,
            luminance: 0.0,
            finish: Finish::Plastic,
        }
    }

    /// Surface material for triangles and quads
    pub fn material(&self) -> MaterialDescriptor {
        let (roughness, metalness) = self.finish.surface();
        let mut material = MaterialDescriptor::new(MaterialKind::Standard)
            .with_name(self.name.clone())
            .with(MaterialProperty::Color, PropertyValue::Color(self.value))
            .with(MaterialProperty::Roughness, PropertyValue::Scalar(roughness))
            .with(MaterialProperty::Metalness, PropertyValue::Scalar(metalness));

        if self.alpha < 1.0 {
            material.set(MaterialProperty::Opacity, PropertyValue::Scalar(self.alpha));
            material.set(MaterialProperty::Transparent, PropertyValue::Flag(true));
        }
        if self.luminance > 0.0 {
            let [r, g, b] = self.value.to_array();
            let glow = self.luminance;
            material.set(
                MaterialProperty::Emissive,
                PropertyValue::Color(Color::rgb(r * glow, g * glow, b * glow)),
            );
        }
        material
    }

    /// Unlit material for edge lines
    pub fn edge_material(&self) -> MaterialDescriptor {
        MaterialDescriptor::new(MaterialKind::Basic)
            .with_name(format!("{}_edge", self.name))
            .with(MaterialProperty::Color, PropertyValue::Color(self.edge))
    }
}

/// Parse a colour code token, decimal or `0x` hexadecimal
pub fn parse_code(token: &str) -> Option<u32> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_hex_colour(token: &str) -> Option<Color> {
    let hex = token.strip_prefix('#')?;
    u32::from_str_radix(hex, 16).ok().map(Color::from_hex)
}

/// Code → definition lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColourTable {
    colours: HashMap<u32, ColourDef>,
}

impl ColourTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `!COLOUR` line of an LDraw file
    pub fn parse(text: &str) -> Result<Self, LDrawError> {
        let mut table = Self::new();
        for (index, line) in text.lines().enumerate() {
            if let Some(colour) = table.parse_line(line, index + 1)? {
                table.insert(colour);
            }
        }
        log::debug!("Parsed {} LDraw colour definitions", table.len());
        Ok(table)
    }

    /// Parse one `0 !COLOUR …` line; other lines yield `None`
    ///
    /// Numeric `EDGE` references resolve against colours already in the table.
    pub fn parse_line(&self, line: &str, number: usize) -> Result<Option<ColourDef>, LDrawError> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("0") || tokens.next() != Some("!COLOUR") {
            return Ok(None);
        }
        let error = |message: &str| LDrawError::Parse {
            line: number,
            message: message.to_string(),
        };

        let name = tokens.next().ok_or_else(|| error("!COLOUR without a name"))?;
        let mut code = None;
        let mut value = None;
        let mut edge = None;
        let mut alpha = 1.0;
        let mut luminance = 0.0;
        let mut finish = Finish::Plastic;

        while let Some(token) = tokens.next() {
            match token {
                "CODE" => code = tokens.next().and_then(parse_code),
                "VALUE" => value = tokens.next().and_then(parse_hex_colour),
                "EDGE" => {
                    let Some(reference) = tokens.next() else {
                        continue;
                    };
                    edge = parse_hex_colour(reference).or_else(|| {
                        parse_code(reference).and_then(|code| self.get(code).map(|def| def.value))
                    });
                }
                "ALPHA" => {
                    if let Some(value) = tokens.next().and_then(|a| a.parse::<f32>().ok()) {
                        alpha = (value / 255.0).clamp(0.0, 1.0);
                    }
                }
                "LUMINANCE" => {
                    if let Some(value) = tokens.next().and_then(|l| l.parse::<f32>().ok()) {
                        luminance = (value / 255.0).clamp(0.0, 1.0);
                    }
                }
                "CHROME" => finish = Finish::Chrome,
                "PEARLESCENT" => finish = Finish::Pearlescent,
                "RUBBER" => finish = Finish::Rubber,
                "MATTE_METALLIC" => finish = Finish::MatteMetallic,
                "METAL" => finish = Finish::Metal,
                "MATERIAL" => break,
                _ => {}
            }
        }

        let code = code.ok_or_else(|| error("!COLOUR without CODE"))?;
        let value = value.ok_or_else(|| error("!COLOUR without VALUE"))?;

        Ok(Some(ColourDef {
            code,
            name: name.to_string(),
            value,
            edge: edge.unwrap_or(Color::BLACK),
            alpha,
            luminance,
            finish,
        }))
    }

    pub fn insert(&mut self, colour: ColourDef) {
        self.colours.insert(colour.code, colour);
    }

    pub fn get(&self, code: u32) -> Option<&ColourDef> {
        self.colours.get(&code)
    }

    /// Definition for `code`, falling back to direct colours
    pub fn resolve(&self, code: u32) -> Option<ColourDef> {
        self.get(code).cloned().or_else(|| ColourDef::direct(code))
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }
}
