// lopdf-backed document reader: word boxes from the page content stream
use image::DynamicImage;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::system_pdf_renderer::SystemPdfRenderer;
use crate::types::{MailscanError, Page, Result, WordBox};

/// Characters further apart than this start a new word.
const WORD_TOLERANCE: f32 = 3.0;
const LETTER: (f32, f32) = (612.0, 792.0);

/// A batch of pages the pipeline can read word boxes from and rasterize.
pub trait DocumentBatch {
    fn name(&self) -> &str;
    fn page_count(&self) -> usize;
    /// Zero-based page access.
    fn page(&self, index: usize) -> Result<Page>;
    fn rasterize(&self, index: usize, dpi: u32) -> Result<DynamicImage>;
}

/// An opened PDF file. Dropping it releases the parsed document.
pub struct PdfDocument {
    path: PathBuf,
    name: String,
    document: Document,
    page_ids: Vec<ObjectId>,
    renderer: SystemPdfRenderer,
}

impl PdfDocument {
    pub fn open(path: &Path, renderer: SystemPdfRenderer) -> Result<Self> {
        let document = Document::load(path)
            .map_err(|e| MailscanError::Pdf(format!("{}: {}", path.display(), e)))?;
        let page_ids = document.get_pages().into_values().collect();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            document,
            page_ids,
            renderer,
        })
    }
}

impl DocumentBatch for PdfDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page(&self, index: usize) -> Result<Page> {
        let page_id = *self
            .page_ids
            .get(index)
            .ok_or_else(|| MailscanError::Pdf(format!("page {} out of range", index + 1)))?;
        let page_dict = self.document.get_object(page_id)?.as_dict()?;

        let (llx, lly, width, height) = media_box(&self.document, page_dict);
        let words = match page_words(&self.document, page_id, page_dict, llx, lly, height) {
            Ok(words) => words,
            Err(e) => {
                warn!("{} page {}: unreadable text layer: {}", self.name, index + 1, e);
                Vec::new()
            }
        };

        Ok(Page::new(index, width, height, words))
    }

    fn rasterize(&self, index: usize, dpi: u32) -> Result<DynamicImage> {
        self.renderer.render_page(&self.path, index, dpi)
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Look a key up on the page, then on its ancestors.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        current = resolve_dict(doc, current.get(b"Parent").ok()?)?;
    }
    None
}

fn media_box(doc: &Document, page: &Dictionary) -> (f32, f32, f32, f32) {
    let values: Option<Vec<f32>> = inherited(doc, page, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .map(|arr| arr.iter().filter_map(|o| resolve(doc, o).and_then(number)).collect());

    match values.as_deref() {
        Some([x0, y0, x1, y1]) => (x0.min(*x1), y0.min(*y1), (x1 - x0).abs(), (y1 - y0).abs()),
        _ => (0.0, 0.0, LETTER.0, LETTER.1),
    }
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32, m: &Matrix) -> Matrix {
    multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], m)
}

#[derive(Debug, Default)]
struct FontInfo {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    to_unicode: HashMap<u32, String>,
}

impl FontInfo {
    fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self.cid_widths.get(&code).copied().unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        if self.two_byte {
            char::from_u32(code).map(String::from).unwrap_or_default()
        } else {
            // Latin-1 for simple fonts without a ToUnicode map
            char::from(code as u8).to_string()
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| if c.len() == 2 { (c[0] as u32) << 8 | c[1] as u32 } else { c[0] as u32 })
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }
}

fn load_font(doc: &Document, font: &Dictionary) -> FontInfo {
    let subtype = font.get(b"Subtype").and_then(|o| o.as_name()).unwrap_or_default();
    let base_font = font.get(b"BaseFont").and_then(|o| o.as_name()).unwrap_or_default();
    let monospace = base_font.starts_with(b"Courier");

    let mut info = FontInfo {
        default_width: if monospace { 600.0 } else { 500.0 },
        ..FontInfo::default()
    };

    if subtype == b"Type0" {
        info.two_byte = true;
        info.default_width = 1000.0;
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve_dict(doc, o));
        if let Some(cid_font) = descendant {
            if let Some(dw) = cid_font.get(b"DW").ok().and_then(number) {
                info.default_width = dw;
            }
            if let Some(w) = cid_font.get(b"W").ok().and_then(|o| resolve(doc, o)).and_then(|o| o.as_array().ok()) {
                info.cid_widths = parse_cid_widths(doc, w);
            }
        }
    } else {
        info.first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(number)
            .map(|n| n as u32)
            .unwrap_or(0);
        if let Some(widths) = font.get(b"Widths").ok().and_then(|o| resolve(doc, o)).and_then(|o| o.as_array().ok()) {
            info.widths = widths
                .iter()
                .map(|o| resolve(doc, o).and_then(number).unwrap_or(0.0))
                .collect();
        }
    }

    if let Some(Object::Stream(stream)) = font.get(b"ToUnicode").ok().and_then(|o| resolve(doc, o)) {
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        info.to_unicode = parse_to_unicode(&String::from_utf8_lossy(&data));
    }

    info
}

/// Widest code span a single `/W` or `bfrange` entry may cover; two-byte codes top out here.
const MAX_CODE_RANGE: u32 = 0xFFFF;

/// `/W` entries are either `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(&w[i]) else { break };
        let first = first as u32;
        match w.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset).ok().and_then(|o| first.checked_add(o)) else {
                        break;
                    };
                    if let Some(width) = number(value) {
                        widths.insert(cid, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (number(last), w.get(i + 2).and_then(number)) else {
                    break;
                };
                let last = last as u32;
                if last >= first && last - first <= MAX_CODE_RANGE {
                    for cid in first..=last {
                        widths.insert(cid, width);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

static BFCHAR_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)beginbfchar(.*?)endbfchar").unwrap());
static BFRANGE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)beginbfrange(.*?)endbfrange").unwrap());
static BFCHAR_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap());
static BFRANGE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(<[0-9A-Fa-f]*>|\[[^\]]*\])").unwrap()
});
static HEX_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").unwrap());

fn hex_units(hex: &str) -> Vec<u16> {
    let bytes: Vec<u8> = hex
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect();
    bytes
        .chunks(2)
        .map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 })
        .collect()
}

fn hex_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

/// Minimal ToUnicode CMap reader covering `bfchar` and `bfrange`.
fn parse_to_unicode(cmap: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();

    for block in BFCHAR_BLOCK.captures_iter(cmap) {
        for pair in BFCHAR_PAIR.captures_iter(&block[1]) {
            if let Some(code) = hex_code(&pair[1]) {
                map.insert(code, String::from_utf16_lossy(&hex_units(&pair[2])));
            }
        }
    }

    for block in BFRANGE_BLOCK.captures_iter(cmap) {
        for entry in BFRANGE_ENTRY.captures_iter(&block[1]) {
            let (Some(lo), Some(hi)) = (hex_code(&entry[1]), hex_code(&entry[2])) else {
                continue;
            };
            let target = &entry[3];
            if target.starts_with('[') {
                for (offset, dst) in HEX_STRING.captures_iter(target).enumerate() {
                    let Some(code) = u32::try_from(offset).ok().and_then(|o| lo.checked_add(o)) else {
                        break;
                    };
                    if code > hi {
                        break;
                    }
                    map.insert(code, String::from_utf16_lossy(&hex_units(&dst[1])));
                }
            } else {
                let base = hex_units(target.trim_matches(|c| c == '<' || c == '>'));
                if base.is_empty() || hi < lo || hi - lo > MAX_CODE_RANGE {
                    continue;
                }
                for code in lo..=hi {
                    let mut units = base.clone();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add((code - lo) as u16);
                    }
                    map.insert(code, String::from_utf16_lossy(&units));
                }
            }
        }
    }

    map
}

fn page_fonts(doc: &Document, page: &Dictionary) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let font_dict = inherited(doc, page, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|o| resolve_dict(doc, o));

    if let Some(font_dict) = font_dict {
        for (name, value) in font_dict.iter() {
            if let Some(font) = resolve_dict(doc, value) {
                fonts.insert(name.clone(), load_font(doc, font));
            }
        }
    }
    fonts
}

#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    x0: f32,
    x1: f32,
    top: f32,
    bottom: f32,
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct Interpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    fallback: FontInfo,
    font: Option<Vec<u8>>,
    state: TextState,
    ctm: Matrix,
    stack: Vec<(Matrix, TextState, Option<Vec<u8>>)>,
    tm: Matrix,
    tlm: Matrix,
    origin: (f32, f32),
    page_height: f32,
    glyphs: Vec<Glyph>,
}

impl<'a> Interpreter<'a> {
    fn new(fonts: &'a HashMap<Vec<u8>, FontInfo>, llx: f32, lly: f32, page_height: f32) -> Self {
        Self {
            fonts,
            fallback: FontInfo { default_width: 500.0, ..FontInfo::default() },
            font: None,
            state: TextState::default(),
            ctm: IDENTITY,
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            origin: (llx, lly),
            page_height,
            glyphs: Vec::new(),
        }
    }

    fn current_font(&self) -> &FontInfo {
        self.font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback)
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = translate(tx, ty, &self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, bytes: &[u8]) {
        let state = self.state;
        let font = self.current_font();
        let mut placed = Vec::new();
        let mut tm = self.tm;

        for code in font.codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let params = [state.size * state.h_scale, 0.0, 0.0, state.size, 0.0, state.rise];
            let trm = multiply(&multiply(&params, &tm), &self.ctm);

            let x = trm[4] - self.origin.0;
            let y = trm[5] - self.origin.1;
            let advance = w0 * (trm[0] * trm[0] + trm[1] * trm[1]).sqrt();
            let height = (trm[2] * trm[2] + trm[3] * trm[3]).sqrt();

            placed.push(Glyph {
                text: font.decode(code),
                x0: x,
                x1: x + advance,
                top: self.page_height - (y + height),
                bottom: self.page_height - y,
            });

            let mut tx = w0 * state.size + state.char_spacing;
            if !font.two_byte && code == 32 {
                tx += state.word_spacing;
            }
            tm = translate(tx * state.h_scale, 0.0, &tm);
        }

        self.tm = tm;
        self.glyphs.extend(placed);
    }

    fn kern(&mut self, amount: f32) {
        let tx = -amount / 1000.0 * self.state.size * self.state.h_scale;
        self.tm = translate(tx, 0.0, &self.tm);
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => self.stack.push((self.ctm, self.state, self.font.clone())),
                "Q" => {
                    if let Some((ctm, state, font)) = self.stack.pop() {
                        self.ctm = ctm;
                        self.state = state;
                        self.font = font;
                    }
                }
                "cm" if nums.len() == 6 => {
                    let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                    self.ctm = multiply(&m, &self.ctm);
                }
                "BT" => {
                    self.tm = IDENTITY;
                    self.tlm = IDENTITY;
                }
                "Tf" => {
                    self.font = op.operands.first().and_then(|o| o.as_name().ok()).map(|n| n.to_vec());
                    if let Some(size) = op.operands.get(1).and_then(number) {
                        self.state.size = size;
                    }
                }
                "Tc" if !nums.is_empty() => self.state.char_spacing = nums[0],
                "Tw" if !nums.is_empty() => self.state.word_spacing = nums[0],
                "Tz" if !nums.is_empty() => self.state.h_scale = nums[0] / 100.0,
                "TL" if !nums.is_empty() => self.state.leading = nums[0],
                "Ts" if !nums.is_empty() => self.state.rise = nums[0],
                "Td" if nums.len() == 2 => self.next_line(nums[0], nums[1]),
                "TD" if nums.len() == 2 => {
                    self.state.leading = -nums[1];
                    self.next_line(nums[0], nums[1]);
                }
                "Tm" if nums.len() == 6 => {
                    self.tlm = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                    self.tm = self.tlm;
                }
                "T*" => self.next_line(0.0, -self.state.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.state.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    if nums.len() >= 2 {
                        self.state.word_spacing = nums[0];
                        self.state.char_spacing = nums[1];
                    }
                    self.next_line(0.0, -self.state.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Some(amount) = number(other) {
                                        self.kern(amount);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Group glyphs into words the way pdfplumber does: whitespace ends a word,
/// and so does a jump of more than the tolerance in either direction.
fn glyphs_to_words(glyphs: &[Glyph]) -> Vec<WordBox> {
    let mut words = Vec::new();
    let mut current: Option<WordBox> = None;
    let mut last_x0 = 0.0f32;

    for glyph in glyphs {
        if glyph.text.trim().is_empty() {
            words.extend(current.take());
            continue;
        }

        let starts_new = match &current {
            Some(word) => {
                (glyph.top - word.top).abs() > WORD_TOLERANCE
                    || glyph.x0 > word.x1 + WORD_TOLERANCE
                    || glyph.x0 < last_x0 - WORD_TOLERANCE
            }
            None => true,
        };

        if starts_new {
            words.extend(current.take());
            current = Some(WordBox::new(glyph.text.clone(), glyph.x0, glyph.top, glyph.x1, glyph.bottom));
        } else if let Some(word) = current.as_mut() {
            word.text.push_str(&glyph.text);
            word.x1 = word.x1.max(glyph.x1);
            word.top = word.top.min(glyph.top);
            word.bottom = word.bottom.max(glyph.bottom);
        }
        last_x0 = glyph.x0;
    }

    words.extend(current);
    words
}

fn page_words(
    doc: &Document,
    page_id: ObjectId,
    page: &Dictionary,
    llx: f32,
    lly: f32,
    height: f32,
) -> Result<Vec<WordBox>> {
    let data = doc.get_page_content(page_id)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let content = Content::decode(&data)?;
    let fonts = page_fonts(doc, page);

    let mut interpreter = Interpreter::new(&fonts, llx, lly, height);
    interpreter.run(&content);
    debug!("decoded {} glyphs", interpreter.glyphs.len());

    Ok(glyphs_to_words(&interpreter.glyphs))
}
