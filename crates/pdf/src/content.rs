//! Content stream interpreter.
//!
//! Walks a page's operations once, tracking the graphics and text state,
//! and reports every shown glyph with its position in default user space.
//! Both extraction and redaction are driven by the same walk, so a glyph
//! found by search is exactly the glyph removed at commit. Form XObjects
//! invoked with `Do` are walked in place with their own resources.

use lopdf::content::Operation;
use lopdf::{Object, ObjectId};
use pdfscrub_core::{Point, Quad};

use crate::font::Font;
use crate::resources::Resources;
use crate::utils::{get_matrix, get_number, Matrix};

/// Forms nested deeper than this are not walked.
pub(crate) const MAX_FORM_DEPTH: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct TextState {
    pub char_spacing: f32,
    pub word_spacing: f32,
    /// `Tz / 100`
    pub hscale: f32,
    pub leading: f32,
    pub font: Option<Vec<u8>>,
    pub size: f32,
    pub rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            hscale: 1.0,
            leading: 0.0,
            font: None,
            size: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// One shown glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    /// Raw code bytes as they appear in the string operand
    pub bytes: Vec<u8>,
    pub text: String,
    pub quad: Quad,
    /// Baseline start in user space
    pub origin: Point,
    /// Baseline end after the full advance, spacing included
    pub end: Point,
    /// Glyph displacement `w0` in thousandths of text space units
    pub width: f32,
    /// `Tc` plus `Tw` when word spacing applied, in unscaled text space units
    pub spacing: f32,
    /// Index of the string element of a `TJ` array (0 for other operators)
    pub element: usize,
}

/// Glyphs shown by one operator.
#[derive(Debug, Clone)]
pub struct ShowText {
    /// Index of the operator in the decoded operation list of the stream
    /// that contains it
    pub op_index: usize,
    /// Indices of the `Do` operators leading to that stream, outermost
    /// first; empty for the stream being interpreted
    pub forms: Vec<usize>,
    /// `BT`/`ET` block counter, starting at 0
    pub block: usize,
    /// Text state in effect when the glyphs were shown
    pub state: TextState,
    /// Font size in user space
    pub user_size: f32,
    pub glyphs: Vec<Glyph>,
}

struct Interpreter<'a> {
    resources: &'a Resources<'a>,
    fallback: Font,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    lm: Matrix,
    block: usize,
    in_text: bool,
    shown: Vec<ShowText>,
    forms: Vec<usize>,
    /// Forms currently being walked, to break reference cycles
    ancestors: Vec<ObjectId>,
}

/// Interpret `operations` and return every show operator with its glyphs,
/// in content order, including the text of invoked form XObjects.
pub fn interpret(operations: &[Operation], resources: &Resources<'_>) -> Vec<ShowText> {
    let gs = GraphicsState {
        ctm: Matrix::IDENTITY,
        text: TextState::default(),
    };
    let mut interp = Interpreter::new(resources, gs, 0, Vec::new(), Vec::new());
    interp.run(operations);
    interp.shown
}

impl<'a> Interpreter<'a> {
    fn new(
        resources: &'a Resources<'a>,
        gs: GraphicsState,
        block: usize,
        forms: Vec<usize>,
        ancestors: Vec<ObjectId>,
    ) -> Self {
        Self {
            resources,
            fallback: Font::default(),
            gs,
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            lm: Matrix::IDENTITY,
            block,
            in_text: false,
            shown: Vec::new(),
            forms,
            ancestors,
        }
    }

    fn run(&mut self, operations: &[Operation]) {
        for (index, op) in operations.iter().enumerate() {
            self.step(index, op);
        }
    }

    /// Walk the form registered as `name` under the current graphics state.
    fn invoke_form(&mut self, index: usize, name: &[u8]) {
        if self.forms.len() >= MAX_FORM_DEPTH {
            log::warn!("[XObject] forms nested too deep, skipping /{}", String::from_utf8_lossy(name));
            return;
        }
        let Some(form) = self.resources.form(name) else {
            return;
        };
        if self.ancestors.contains(&form.id) {
            log::warn!("[XObject] form {:?} invokes itself, skipping", form.id);
            return;
        }

        let mut gs = self.gs.clone();
        gs.ctm = form.matrix.then(&self.gs.ctm);
        let mut forms = self.forms.clone();
        forms.push(index);
        let mut ancestors = self.ancestors.clone();
        ancestors.push(form.id);

        let mut nested = Interpreter::new(&form.resources, gs, self.block, forms, ancestors);
        nested.run(&form.operations);
        self.block = nested.block;
        self.shown.append(&mut nested.shown);
    }

    fn step(&mut self, index: usize, op: &Operation) {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(get_number);

        match op.operator.as_str() {
            "q" => self.stack.push(self.gs.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.gs = saved;
                }
            }
            "cm" => {
                if let Some(m) = get_matrix(operands) {
                    self.gs.ctm = m.then(&self.gs.ctm);
                }
            }
            "BT" => {
                self.in_text = true;
                self.tm = Matrix::IDENTITY;
                self.lm = Matrix::IDENTITY;
            }
            "ET" => {
                if self.in_text {
                    self.block += 1;
                }
                self.in_text = false;
            }
            "Tm" => {
                if let Some(m) = get_matrix(operands) {
                    self.tm = m;
                    self.lm = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.gs.text.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "TL" => {
                if let Some(v) = num(0) {
                    self.gs.text.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = num(0) {
                    self.gs.text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = num(0) {
                    self.gs.text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = num(0) {
                    self.gs.text.hscale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = num(0) {
                    self.gs.text.rise = v;
                }
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.gs.text.font = Some(name.clone());
                }
                if let Some(size) = num(1) {
                    self.gs.text.size = size;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(index, &[(0, bytes.as_slice())], &[]);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(index, &[(0, bytes.as_slice())], &[]);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    self.gs.text.word_spacing = aw;
                    self.gs.text.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(index, &[(0, bytes.as_slice())], &[]);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(index, items);
                }
            }
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.invoke_form(index, name);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.lm = Matrix::translate(tx, ty).then(&self.lm);
        self.tm = self.lm;
    }

    fn next_line(&mut self) {
        let leading = self.gs.text.leading;
        self.move_line(0.0, -leading);
    }

    fn show_array(&mut self, index: usize, items: &[Object]) {
        let mut strings = Vec::new();
        // (position in `strings` before which the adjustment applies, amount)
        let mut adjustments = Vec::new();
        for (element, item) in items.iter().enumerate() {
            match item {
                Object::String(bytes, _) => strings.push((element, bytes.as_slice())),
                other => {
                    if let Some(n) = get_number(other) {
                        adjustments.push((strings.len(), n));
                    }
                }
            }
        }
        self.show(index, &strings, &adjustments);
    }

    /// Show `strings` in order, applying each `TJ` adjustment before the
    /// string at its position.
    fn show(&mut self, index: usize, strings: &[(usize, &[u8])], adjustments: &[(usize, f32)]) {
        let state = self.gs.text.clone();
        let font = state
            .font
            .as_ref()
            .and_then(|name| self.resources.fonts.get(name))
            .unwrap_or(&self.fallback);
        let size = state.size;
        let hscale = state.hscale;

        let mut glyphs = Vec::new();
        let mut pending = adjustments.iter().peekable();

        for (position, (element, bytes)) in strings.iter().enumerate() {
            while let Some((_, n)) = pending.next_if(|(at, _)| *at <= position) {
                self.tm = Matrix::translate(-n / 1000.0 * size * hscale, 0.0).then(&self.tm);
            }

            for code in font.codes(bytes) {
                let w0 = font.width(code.code);
                let word = if font.is_word_space(&code) {
                    state.word_spacing
                } else {
                    0.0
                };
                let spacing = state.char_spacing + word;
                let advance = (w0 / 1000.0 * size + spacing) * hscale;

                let trm = self.tm.then(&self.gs.ctm);
                let glyph_width = w0 / 1000.0 * size * hscale;
                let bottom = font.descent / 1000.0 * size + state.rise;
                let top = font.ascent / 1000.0 * size + state.rise;
                let quad = Quad {
                    ll: trm.apply(0.0, bottom),
                    lr: trm.apply(glyph_width, bottom),
                    ur: trm.apply(glyph_width, top),
                    ul: trm.apply(0.0, top),
                };

                glyphs.push(Glyph {
                    text: font.text(code.code),
                    code: code.code,
                    bytes: code.bytes,
                    quad,
                    origin: trm.apply(0.0, state.rise),
                    end: trm.apply(advance, state.rise),
                    width: w0,
                    spacing,
                    element: *element,
                });

                self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
            }
        }
        for (_, n) in pending {
            self.tm = Matrix::translate(-n / 1000.0 * size * hscale, 0.0).then(&self.tm);
        }

        let user_size = self.tm.then(&self.gs.ctm).vertical_scale(size);
        self.shown.push(ShowText {
            op_index: index,
            forms: self.forms.clone(),
            block: self.block,
            state,
            user_size,
            glyphs,
        });
    }
}
