//! Minimal PDF 1.4 writer: standard Helvetica text, filled and stroked
//! rectangles, lines, and JPEG images passed through with `DCTDecode`.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner.

use anyhow::{anyhow, Context};
use std::fmt::Write as _;
use std::path::Path;

pub const A4_WIDTH: f64 = 595.28;
pub const A4_HEIGHT: f64 = 841.89;
pub const INCH: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color::gray(0.0);
    pub const GREY: Color = Color::gray(0.5);
    pub const LIGHT_GREY: Color = Color::gray(0.827);
    pub const WHITE_SMOKE: Color = Color::gray(0.961);

    pub const fn gray(v: f64) -> Color {
        Color { r: v, g: v, b: v }
    }

    pub const fn rgb(r: f64, g: f64, b: f64) -> Color {
        Color { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Approximate Helvetica advance width in em units.
fn glyph_em(c: char) -> f64 {
    match c {
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '|' | '!' | '\'' => 0.24,
        'f' | 'r' | 't' | '(' | ')' | '[' | ']' | '-' | ' ' | '/' | 'I' => 0.32,
        'm' | 'w' => 0.82,
        'M' | 'W' => 0.86,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.556,
        _ => 0.54,
    }
}

pub fn text_width(s: &str, size: f64, font: Font) -> f64 {
    let em: f64 = s.chars().map(glyph_em).sum();
    let factor = if font == Font::Bold { 1.05 } else { 1.0 };
    em * size * factor
}

/// Shortens `s` with a trailing ellipsis so it fits in `max_width`.
pub fn fit_text(s: &str, size: f64, font: Font, max_width: f64) -> String {
    if text_width(s, size, font) <= max_width {
        return s.to_string();
    }
    let mut out = String::new();
    for c in s.chars() {
        let candidate = format!("{out}{c}...");
        if text_width(&candidate, size, font) > max_width {
            break;
        }
        out.push(c);
    }
    out.push_str("...");
    out
}

#[derive(Debug, Clone)]
pub struct JpegImage {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    data: Vec<u8>,
}

impl JpegImage {
    /// JPEG files are embedded as they are; PNG, BMP and GIF photos are
    /// decoded and re-encoded as JPEG first.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.to_string_lossy()))?;
        if data.starts_with(&[0xFF, 0xD8]) {
            Self::from_bytes(data)
        } else {
            Self::transcode(&data)
        }
    }

    pub fn transcode(data: &[u8]) -> anyhow::Result<Self> {
        let decoded = image::load_from_memory(data).context("unsupported image format")?;
        let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
        let mut jpeg = Vec::new();
        rgb.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .context("failed to re-encode image as JPEG")?;
        Self::from_bytes(jpeg)
    }

    /// Reads the frame header; the compressed data is embedded untouched.
    pub fn from_bytes(data: Vec<u8>) -> anyhow::Result<Self> {
        if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
            return Err(anyhow!("not a JPEG file"));
        }
        let mut i = 2usize;
        while i + 1 < data.len() {
            if data[i] != 0xFF {
                return Err(anyhow!("corrupt JPEG marker at byte {}", i));
            }
            let marker = data[i + 1];
            if marker == 0xFF {
                i += 1;
                continue;
            }
            if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
                i += 2;
                continue;
            }
            if i + 3 >= data.len() {
                break;
            }
            let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            let is_sof = (0xC0..=0xCF).contains(&marker)
                && marker != 0xC4
                && marker != 0xC8
                && marker != 0xCC;
            if is_sof {
                if i + 9 >= data.len() {
                    break;
                }
                let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
                let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
                let components = data[i + 9];
                if width == 0 || height == 0 {
                    return Err(anyhow!("JPEG has zero dimensions"));
                }
                if !matches!(components, 1 | 3 | 4) {
                    return Err(anyhow!("unsupported JPEG component count {}", components));
                }
                return Ok(Self {
                    width,
                    height,
                    components,
                    data,
                });
            }
            if marker == 0xDA {
                break;
            }
            i += 2 + seg_len;
        }
        Err(anyhow!("JPEG frame header not found"))
    }

    fn color_space(&self) -> &'static str {
        match self.components {
            1 => "/DeviceGray",
            4 => "/DeviceCMYK",
            _ => "/DeviceRGB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageId(usize);

#[derive(Debug, Default)]
pub struct PdfWriter {
    title: String,
    pages: Vec<Vec<u8>>,
    images: Vec<JpegImage>,
}

fn num(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Literal string in WinAnsi bytes; characters outside Latin-1 become `?`.
fn pdf_string(s: &str) -> Vec<u8> {
    let mut out = vec![b'('];
    for c in s.chars() {
        let code = c as u32;
        let byte = if code < 0x20 {
            b' '
        } else if code <= 0x7E || (0xA0..=0xFF).contains(&code) {
            code as u8
        } else {
            b'?'
        };
        if matches!(byte, b'\\' | b'(' | b')') {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out.push(b')');
    out
}

impl PdfWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Starts a new page and returns its index.
    pub fn add_page(&mut self) -> usize {
        self.pages.push(Vec::new());
        self.pages.len() - 1
    }

    pub fn add_image(&mut self, image: JpegImage) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() - 1)
    }

    fn ops(&mut self, page: usize, s: &str) {
        if let Some(content) = self.pages.get_mut(page) {
            content.extend_from_slice(s.as_bytes());
            content.push(b'\n');
        }
    }

    pub fn text(&mut self, page: usize, x: f64, y: f64, size: f64, font: Font, s: &str) {
        self.text_matrix(page, &format!("1 0 0 1 {} {}", num(x), num(y)), size, font, s);
    }

    /// Text running bottom-to-top, as on a vertical axis label.
    pub fn text_vertical(&mut self, page: usize, x: f64, y: f64, size: f64, font: Font, s: &str) {
        self.text_matrix(page, &format!("0 1 -1 0 {} {}", num(x), num(y)), size, font, s);
    }

    fn text_matrix(&mut self, page: usize, matrix: &str, size: f64, font: Font, s: &str) {
        let Some(content) = self.pages.get_mut(page) else {
            return;
        };
        let head = format!(
            "BT /{} {} Tf {} Tm ",
            font.resource(),
            num(size),
            matrix
        );
        content.extend_from_slice(head.as_bytes());
        content.extend_from_slice(&pdf_string(s));
        content.extend_from_slice(b" Tj ET\n");
    }

    pub fn fill_rect(&mut self, page: usize, x: f64, y: f64, w: f64, h: f64, color: Color) {
        let op = format!(
            "q {} {} {} rg {} {} {} {} re f Q",
            num(color.r),
            num(color.g),
            num(color.b),
            num(x),
            num(y),
            num(w),
            num(h)
        );
        self.ops(page, &op);
    }

    pub fn line(&mut self, page: usize, from: (f64, f64), to: (f64, f64), width: f64, color: Color) {
        let op = format!(
            "q {} w {} {} {} RG {} {} m {} {} l S Q",
            num(width),
            num(color.r),
            num(color.g),
            num(color.b),
            num(from.0),
            num(from.1),
            num(to.0),
            num(to.1)
        );
        self.ops(page, &op);
    }

    pub fn image(&mut self, page: usize, id: ImageId, x: f64, y: f64, w: f64, h: f64) {
        let op = format!(
            "q {} 0 0 {} {} {} cm /Im{} Do Q",
            num(w),
            num(h),
            num(x),
            num(y),
            id.0
        );
        self.ops(page, &op);
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.pages.is_empty() {
            self.add_page();
        }

        const CATALOG: usize = 1;
        const PAGES: usize = 2;
        const FONT_REGULAR: usize = 3;
        const FONT_BOLD: usize = 4;
        const INFO: usize = 5;
        let first_image = 6;
        let first_page = first_image + self.images.len();
        let object_count = first_page + 2 * self.pages.len() - 1;

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        let mut offsets = vec![0usize; object_count + 1];

        let mut put = |out: &mut Vec<u8>, id: usize, body: &[u8]| {
            offsets[id] = out.len();
            out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        };

        put(
            &mut out,
            CATALOG,
            format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES).as_bytes(),
        );

        let kids = (0..self.pages.len())
            .map(|i| format!("{} 0 R", first_page + 2 * i))
            .collect::<Vec<_>>()
            .join(" ");
        put(
            &mut out,
            PAGES,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids,
                self.pages.len()
            )
            .as_bytes(),
        );
        put(
            &mut out,
            FONT_REGULAR,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        put(
            &mut out,
            FONT_BOLD,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );

        let mut info = b"<< /Title ".to_vec();
        info.extend_from_slice(&pdf_string(&self.title));
        info.extend_from_slice(b" /Producer ");
        info.extend_from_slice(&pdf_string(&format!(
            "studentd {}",
            env!("CARGO_PKG_VERSION")
        )));
        info.extend_from_slice(b" /CreationDate ");
        info.extend_from_slice(&pdf_string(
            &chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string(),
        ));
        info.extend_from_slice(b" >>");
        put(&mut out, INFO, &info);

        for (i, img) in self.images.iter().enumerate() {
            let mut body = format!(
                "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                img.width,
                img.height,
                img.color_space(),
                img.data.len()
            )
            .into_bytes();
            body.extend_from_slice(&img.data);
            body.extend_from_slice(b"\nendstream");
            put(&mut out, first_image + i, &body);
        }

        let mut resources = format!(
            "<< /Font << /F1 {} 0 R /F2 {} 0 R >>",
            FONT_REGULAR, FONT_BOLD
        );
        if !self.images.is_empty() {
            resources.push_str(" /XObject <<");
            for i in 0..self.images.len() {
                let _ = write!(resources, " /Im{} {} 0 R", i, first_image + i);
            }
            resources.push_str(" >>");
        }
        resources.push_str(" >>");

        for (i, content) in self.pages.iter().enumerate() {
            let page_id = first_page + 2 * i;
            let content_id = page_id + 1;
            put(
                &mut out,
                page_id,
                format!(
                    "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} /Contents {} 0 R >>",
                    PAGES,
                    num(A4_WIDTH),
                    num(A4_HEIGHT),
                    resources,
                    content_id
                )
                .as_bytes(),
            );
            let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            body.extend_from_slice(content);
            body.extend_from_slice(b"\nendstream");
            put(&mut out, content_id, &body);
        }

        let xref_at = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", object_count + 1);
        for off in offsets.iter().skip(1) {
            let _ = writeln!(xref, "{:010} 00000 n ", off);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count + 1,
            CATALOG,
            INFO,
            xref_at
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }
}
