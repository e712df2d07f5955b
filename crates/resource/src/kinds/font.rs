//! Distance-field fonts described by BMFont text files.
//!
//! Glyph metrics are normalized by the font size with the atlas padding
//! removed, so one unit equals one em. Texture coordinates are normalized by
//! the atlas size.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ResourceError, locate};
use crate::gpu::{GpuContext, ImageData};
use crate::kinds::texture::{GpuTexture, decode_image, upload_image};
use crate::resource::{Resource, ResourceKind};

/// One glyph of a font atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub id: u32,
    pub u1: f32,
    pub v1: f32,
    pub u2: f32,
    pub v2: f32,
    pub width: f32,
    pub height: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    pub advance: f32,
}

/// Parsed BMFont descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub size: f32,
    /// Padding in pixels: top, right, bottom, left.
    pub padding: [f32; 4],
    pub line_height: f32,
    pub base: f32,
    pub scale_w: f32,
    pub scale_h: f32,
    pub glyphs: BTreeMap<u32, Glyph>,
}

impl FontDescriptor {
    /// Parse the text variant of the BMFont format.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut size = None;
        let mut padding = [0.0; 4];
        let mut common = None;
        let mut glyphs = BTreeMap::new();

        for (number, line) in text.lines().enumerate() {
            let mut tokens = tokenize(line);
            let Some((tag, _)) = tokens.first().cloned() else {
                continue;
            };
            tokens.remove(0);
            let fields: BTreeMap<&str, &str> = tokens.into_iter().collect();
            let line_no = number + 1;

            match tag {
                "info" => {
                    // Negative sizes mean "match char height" and keep their magnitude.
                    let value = number_field(&fields, "size", line_no)?.abs();
                    if !(value.is_finite() && value > 0.0) {
                        return Err(format!("line {line_no}: font size must be a positive number"));
                    }
                    size = Some(value);
                    if let Some(raw) = fields.get("padding") {
                        padding = parse_padding(raw)
                            .ok_or_else(|| format!("line {line_no}: bad padding '{raw}'"))?;
                    }
                }
                "common" => {
                    let scale_w = number_field(&fields, "scaleW", line_no)?;
                    let scale_h = number_field(&fields, "scaleH", line_no)?;
                    if scale_w <= 0.0 || scale_h <= 0.0 {
                        return Err(format!("line {line_no}: atlas size must be positive"));
                    }
                    let line_height = optional_field(&fields, "lineHeight", line_no)?.unwrap_or(0.0);
                    let base = optional_field(&fields, "base", line_no)?.unwrap_or(0.0);
                    common = Some((line_height, base, scale_w, scale_h));
                }
                "char" => {
                    let (Some(size), Some((_, _, scale_w, scale_h))) = (size, common) else {
                        return Err(format!("line {line_no}: char before info/common"));
                    };
                    let [top, right, _, left] = padding;
                    let id = id_field(&fields, line_no)?;
                    let x = number_field(&fields, "x", line_no)?;
                    let y = number_field(&fields, "y", line_no)?;
                    let width = number_field(&fields, "width", line_no)?;
                    let height = number_field(&fields, "height", line_no)?;
                    let x_offset = number_field(&fields, "xoffset", line_no)?;
                    let y_offset = number_field(&fields, "yoffset", line_no)?;
                    let advance = number_field(&fields, "xadvance", line_no)?;

                    glyphs.insert(
                        id,
                        Glyph {
                            id,
                            u1: x / scale_w,
                            v1: y / scale_h,
                            u2: (x + width) / scale_w,
                            v2: (y + height) / scale_h,
                            width: width / size,
                            height: height / size,
                            x_offset: (x_offset - left) / size,
                            y_offset: (y_offset - top) / size,
                            advance: (advance - left - right) / size,
                        },
                    );
                }
                _ => {}
            }
        }

        let size = size.ok_or("missing info line")?;
        let (line_height, base, scale_w, scale_h) = common.ok_or("missing common line")?;
        if glyphs.is_empty() {
            return Err("no glyphs".into());
        }
        Ok(Self {
            size,
            padding,
            line_height: line_height / size,
            base: base / size,
            scale_w,
            scale_h,
            glyphs,
        })
    }

    pub fn glyph(&self, c: char) -> Option<&Glyph> {
        self.glyphs.get(&(c as u32))
    }

    /// Width of `text` in ems. Unknown characters count as zero.
    pub fn measure(&self, text: &str) -> f32 {
        text.chars()
            .filter_map(|c| self.glyph(c))
            .map(|g| g.advance)
            .sum()
    }
}

/// Split a descriptor line into its tag and `key=value` pairs. Quoted values
/// may contain spaces.
fn tokenize(line: &str) -> Vec<(&str, &str)> {
    let mut tokens = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        let end = rest.find(|c: char| c == '=' || c.is_whitespace()).unwrap_or(rest.len());
        let key = &rest[..end];
        rest = &rest[end..];
        let value = if let Some(after) = rest.strip_prefix('=') {
            if let Some(quoted) = after.strip_prefix('"') {
                let close = quoted.find('"').unwrap_or(quoted.len());
                rest = quoted.get(close + 1..).unwrap_or("");
                &quoted[..close]
            } else {
                let stop = after.find(char::is_whitespace).unwrap_or(after.len());
                rest = &after[stop..];
                &after[..stop]
            }
        } else {
            ""
        };
        tokens.push((key, value));
        rest = rest.trim_start();
    }
    tokens
}

fn optional_field(fields: &BTreeMap<&str, &str>, key: &str, line: usize) -> Result<Option<f32>, String> {
    fields
        .get(key)
        .map(|raw| {
            raw.parse::<f32>()
                .map_err(|_| format!("line {line}: {key}={raw} is not a number"))
        })
        .transpose()
}

fn number_field(fields: &BTreeMap<&str, &str>, key: &str, line: usize) -> Result<f32, String> {
    optional_field(fields, key, line)?.ok_or_else(|| format!("line {line}: missing {key}"))
}

fn id_field(fields: &BTreeMap<&str, &str>, line: usize) -> Result<u32, String> {
    let raw = fields.get("id").ok_or_else(|| format!("line {line}: missing id"))?;
    raw.parse::<u32>()
        .map_err(|_| format!("line {line}: id={raw} is not a character code"))
}

fn parse_padding(raw: &str) -> Option<[f32; 4]> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect::<Option<Vec<_>>>()?;
    values.try_into().ok()
}

/// Where a font is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSource {
    /// Distance-field atlas image.
    pub atlas: PathBuf,
    /// BMFont text descriptor.
    pub info: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FontStaged {
    atlas: ImageData,
    descriptor: FontDescriptor,
}

/// An uploaded font: atlas texture plus glyph table.
#[derive(Debug, Clone)]
pub struct GpuFont {
    pub atlas: GpuTexture,
    pub descriptor: FontDescriptor,
}

#[derive(Debug)]
pub struct FontKind;

impl ResourceKind for FontKind {
    const KIND: &'static str = "font";
    type Source = FontSource;
    type Staged = FontStaged;
    type Uploaded = GpuFont;

    fn decode(source: FontSource) -> Result<FontStaged, ResourceError> {
        let info = locate(&source.info)?;
        let what = info.display().to_string();
        let text = std::fs::read_to_string(&info).map_err(|e| ResourceError::decode(&what, e))?;
        let descriptor = FontDescriptor::parse(&text).map_err(|e| ResourceError::decode(&what, e))?;
        let atlas = decode_image(&source.atlas)?;
        Ok(FontStaged { atlas, descriptor })
    }

    fn upload(staged: FontStaged, gpu: &dyn GpuContext, label: &str) -> Result<GpuFont, ResourceError> {
        let atlas = upload_image(&staged.atlas, gpu, label)?;
        Ok(GpuFont {
            atlas,
            descriptor: staged.descriptor,
        })
    }

    fn release(uploaded: &GpuFont, gpu: &dyn GpuContext) {
        gpu.release_texture(uploaded.atlas.id);
    }
}

pub type FontResource = Resource<FontKind>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessContext;
    use crate::state::ResourceState;
    use sensorview_common::{MessageLevel, MessageLog};
    use std::rc::Rc;

    const DESCRIPTOR: &str = r#"info face="DejaVu Sans" size=32 bold=0 italic=0 charset="" unicode=1 stretchH=100 smooth=1 aa=1 padding=4,4,4,4 spacing=0,0
common lineHeight=40 base=32 scaleW=256 scaleH=128 pages=1 packed=0
page id=0 file="dejavu.png"
chars count=2
char id=65 x=0 y=0 width=24 height=32 xoffset=2 yoffset=6 xadvance=28 page=0 chnl=15
char id=32 x=64 y=64 width=0 height=0 xoffset=4 yoffset=4 xadvance=16 page=0 chnl=15
"#;

    #[test]
    fn quoted_values_keep_spaces() {
        let tokens = tokenize(r#"info face="DejaVu Sans" size=32"#);
        assert_eq!(tokens, vec![("info", ""), ("face", "DejaVu Sans"), ("size", "32")]);
    }

    #[test]
    fn glyphs_are_normalized_by_size_and_padding() {
        let font = FontDescriptor::parse(DESCRIPTOR).unwrap();
        assert_eq!(font.size, 32.0);
        assert_eq!(font.padding, [4.0; 4]);
        assert_eq!(font.glyphs.len(), 2);

        let a = font.glyph('A').unwrap();
        assert_eq!(a.u1, 0.0);
        assert_eq!(a.u2, 24.0 / 256.0);
        assert_eq!(a.v2, 32.0 / 128.0);
        assert_eq!(a.width, 0.75);
        assert_eq!(a.height, 1.0);
        assert_eq!(a.x_offset, (2.0 - 4.0) / 32.0);
        assert_eq!(a.y_offset, (6.0 - 4.0) / 32.0);
        assert_eq!(a.advance, 20.0 / 32.0);
        assert_eq!(font.line_height, 40.0 / 32.0);
    }

    #[test]
    fn measure_sums_advances() {
        let font = FontDescriptor::parse(DESCRIPTOR).unwrap();
        assert_eq!(font.measure("A A"), 20.0 / 32.0 * 2.0 + 8.0 / 32.0);
        assert_eq!(font.measure("\u{2603}"), 0.0);
    }

    #[test]
    fn char_before_common_is_rejected() {
        let text = "info size=32\nchar id=65 x=0 y=0 width=1 height=1 xoffset=0 yoffset=0 xadvance=1\n";
        assert!(FontDescriptor::parse(text).unwrap_err().contains("before"));
    }

    #[test]
    fn size_must_be_a_positive_number() {
        for size in ["0", "NaN", "inf"] {
            let text = format!("info size={size}\n");
            let err = FontDescriptor::parse(&text).unwrap_err();
            assert!(err.contains("positive"), "size={size}: {err}");
        }

        let matched = DESCRIPTOR.replacen("size=32", "size=-32", 1);
        assert_eq!(FontDescriptor::parse(&matched).unwrap().size, 32.0);
    }

    #[test]
    fn glyph_ids_must_be_character_codes() {
        for id in ["-1", "65.5"] {
            let text = format!(
                "info size=32\ncommon scaleW=256 scaleH=256\n\
                 char id={id} x=0 y=0 width=1 height=1 xoffset=0 yoffset=0 xadvance=1\n"
            );
            let err = FontDescriptor::parse(&text).unwrap_err();
            assert!(err.contains("line 3"), "id={id}: {err}");
            assert!(err.contains("character code"), "id={id}: {err}");
        }
    }

    #[test]
    fn missing_fields_are_reported_with_line_numbers() {
        let text = "info size=32\ncommon scaleW=256\n";
        let err = FontDescriptor::parse(text).unwrap_err();
        assert!(err.contains("line 2"));
        assert!(err.contains("scaleH"));
    }

    #[test]
    fn font_resource_uploads_atlas() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("dejavu.fnt");
        let atlas = dir.path().join("dejavu.png");
        std::fs::write(&info, DESCRIPTOR).unwrap();
        image::GrayImage::from_pixel(256, 128, image::Luma([0]))
            .save(&atlas)
            .unwrap();

        let gpu = Rc::new(HeadlessContext::new());
        let font = FontResource::new("dejavu", gpu.clone(), Rc::new(MessageLog::new()));
        font.run(FontSource { atlas, info });
        font.ready();
        assert_eq!(font.state(), ResourceState::Uploaded);
        assert_eq!(font.with_uploaded(|f| f.descriptor.glyphs.len()), Some(2));
        assert_eq!(font.with_uploaded(|f| f.atlas.width), Some(256));
    }

    #[test]
    fn broken_descriptor_fails_with_an_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("broken.fnt");
        std::fs::write(&info, "info size=abc\n").unwrap();

        let log = Rc::new(MessageLog::new());
        let font = FontResource::new("broken", Rc::new(HeadlessContext::new()), log.clone());
        font.run(FontSource {
            atlas: dir.path().join("unused.png"),
            info,
        });
        font.ready();
        assert_eq!(font.state(), ResourceState::Failed);
        assert_eq!(log.count(MessageLevel::Error), 1);
    }
}
