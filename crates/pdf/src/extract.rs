//! Structured text extraction and geometric search.

use pdfscrub_core::{Point, Quad, TextRun};

use crate::content::{Glyph, ShowText};

/// Fraction of the font size above which a gap counts as a space.
const SPACE_GAP: f32 = 0.15;
/// Fraction of the font size two baselines may differ by and still match.
const BASELINE_TOLERANCE: f32 = 0.2;

#[derive(Debug, Clone, Copy)]
struct Cursor {
    end: Point,
    /// Unit vector along the baseline
    dir: Point,
    block: usize,
    size: f32,
}

impl Cursor {
    fn after(glyph: &Glyph, block: usize, size: f32) -> Self {
        let dx = glyph.quad.lr.x - glyph.quad.ll.x;
        let dy = glyph.quad.lr.y - glyph.quad.ll.y;
        let len = dx.hypot(dy);
        let dir = if len > f32::EPSILON {
            Point::new(dx / len, dy / len)
        } else {
            // zero-width glyph, fall back to the advance direction
            let ax = glyph.end.x - glyph.origin.x;
            let ay = glyph.end.y - glyph.origin.y;
            let alen = ax.hypot(ay);
            if alen > f32::EPSILON {
                Point::new(ax / alen, ay / alen)
            } else {
                Point::new(1.0, 0.0)
            }
        };
        Self {
            end: glyph.end,
            dir,
            block,
            size,
        }
    }

    /// `(along, across)` offset of `p` from the cursor in baseline terms.
    fn offset(&self, p: Point) -> (f32, f32) {
        let vx = p.x - self.end.x;
        let vy = p.y - self.end.y;
        (
            vx * self.dir.x + vy * self.dir.y,
            (vx * self.dir.y - vy * self.dir.x).abs(),
        )
    }

    fn same_baseline(&self, p: Point) -> bool {
        self.offset(p).1 <= BASELINE_TOLERANCE * self.size.max(1.0)
    }
}

/// A run under construction, with one quad per character.
struct RunBuilder {
    font: Option<Vec<u8>>,
    size: f32,
    block: usize,
    line: usize,
    text: String,
    glyphs: Vec<Quad>,
}

impl RunBuilder {
    fn push(&mut self, glyph: &Glyph) {
        for c in glyph.text.chars() {
            self.text.push(c);
            self.glyphs.push(glyph.quad);
        }
    }

    fn push_space(&mut self, from: Point, to: Point, glyph: &Glyph) {
        self.text.push(' ');
        self.glyphs.push(gap_quad(from, to, glyph));
    }

    fn finish(self) -> TextRun {
        TextRun {
            text: self.text,
            block: self.block,
            line: self.line,
            glyphs: self.glyphs,
        }
    }
}

/// Quad covering the gap between `from` and `to` at the height of `glyph`.
fn gap_quad(from: Point, to: Point, glyph: &Glyph) -> Quad {
    let up = Point::new(glyph.quad.ul.x - glyph.quad.ll.x, glyph.quad.ul.y - glyph.quad.ll.y);
    let down = Point::new(glyph.quad.ll.x - glyph.origin.x, glyph.quad.ll.y - glyph.origin.y);
    let ll = Point::new(from.x + down.x, from.y + down.y);
    let lr = Point::new(to.x + down.x, to.y + down.y);
    Quad {
        ll,
        lr,
        ur: Point::new(lr.x + up.x, lr.y + up.y),
        ul: Point::new(ll.x + up.x, ll.y + up.y),
    }
}

/// Group shown glyphs into runs.
///
/// A run continues while the block, font and size stay the same, the glyph
/// sits on the same baseline, and the gap from the previous glyph is below
/// the font size. Runs on the same baseline within a block share a line.
pub fn build_runs(shown: &[ShowText]) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut current: Option<RunBuilder> = None;
    let mut cursor: Option<Cursor> = None;
    let mut line = 0usize;

    for show in shown {
        let size = show.user_size;
        for glyph in &show.glyphs {
            if glyph.text.is_empty() {
                continue;
            }

            let mut continues = false;
            let mut gap = 0.0;
            if let (Some(run), Some(cur)) = (current.as_ref(), cursor.as_ref()) {
                let (along, _) = cur.offset(glyph.origin);
                let aligned = cur.block == show.block && cur.same_baseline(glyph.origin);
                continues = aligned
                    && run.font == show.state.font
                    && (run.size - size).abs() < 0.01
                    && along > -0.5 * size
                    && along < size;
                gap = along;
                if !aligned {
                    line += 1;
                }
            }

            if !continues {
                if let Some(run) = current.take() {
                    runs.push(run.finish());
                }
                current = Some(RunBuilder {
                    font: show.state.font.clone(),
                    size,
                    block: show.block,
                    line,
                    text: String::new(),
                    glyphs: Vec::new(),
                });
            } else if gap > SPACE_GAP * size && !ends_with_space(current.as_ref()) {
                if let (Some(run), Some(cur)) = (current.as_mut(), cursor.as_ref()) {
                    run.push_space(cur.end, glyph.origin, glyph);
                }
            }

            if let Some(run) = current.as_mut() {
                run.push(glyph);
            }
            cursor = Some(Cursor::after(glyph, show.block, size));
        }
    }

    if let Some(run) = current.take() {
        runs.push(run.finish());
    }
    runs.retain(|r| !r.text.is_empty());
    runs
}

fn ends_with_space(run: Option<&RunBuilder>) -> bool {
    run.is_some_and(|r| r.text.ends_with(char::is_whitespace))
}

/// Text and per-character quads of one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub text: String,
    pub glyphs: Vec<Quad>,
}

/// Join the runs of each line, inserting a space between runs separated by
/// a visible gap.
pub fn build_lines(runs: &[TextRun]) -> Vec<Line> {
    let mut lines: Vec<(usize, Line)> = Vec::new();

    for run in runs {
        match lines.last_mut() {
            Some((index, line)) if *index == run.line => {
                if let (Some(prev), Some(next)) = (line.glyphs.last(), run.glyphs.first()) {
                    let size = (prev.ul.y - prev.ll.y).hypot(prev.ul.x - prev.ll.x);
                    let gap = (next.ll.x - prev.lr.x).hypot(next.ll.y - prev.lr.y);
                    let spaced = line.text.ends_with(char::is_whitespace)
                        || run.text.starts_with(char::is_whitespace);
                    if gap > SPACE_GAP * size && !spaced {
                        line.text.push(' ');
                        line.glyphs.push(Quad {
                            ll: prev.lr,
                            ul: prev.ur,
                            lr: next.ll,
                            ur: next.ul,
                        });
                    }
                }
                line.text.push_str(&run.text);
                line.glyphs.extend_from_slice(&run.glyphs);
            }
            _ => lines.push((
                run.line,
                Line {
                    text: run.text.clone(),
                    glyphs: run.glyphs.clone(),
                },
            )),
        }
    }

    lines.into_iter().map(|(_, line)| line).collect()
}

/// Every non-overlapping, case-sensitive occurrence of `needle`, one quad
/// per occurrence. Occurrences never span lines.
pub fn search_lines(lines: &[Line], needle: &str) -> Vec<Quad> {
    let mut quads = Vec::new();
    if needle.is_empty() {
        return quads;
    }

    for line in lines {
        for (byte, found) in line.text.match_indices(needle) {
            let first = line.text[..byte].chars().count();
            let last = first + found.chars().count() - 1;
            if let (Some(a), Some(b)) = (line.glyphs.get(first), line.glyphs.get(last)) {
                quads.push(Quad::span(a, b));
            }
        }
    }
    quads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::interpret;
    use crate::resources::Resources;
    use lopdf::content::Content;

    fn runs_of(src: &str) -> Vec<TextRun> {
        let ops = Content::decode(src.as_bytes()).unwrap().operations;
        build_runs(&interpret(&ops, &Resources::default()))
    }

    #[test]
    fn test_split_show_operators_join_into_one_run() {
        let runs = runs_of("BT /F1 10 Tf 0 0 Td (Jane ) Tj (Doe) Tj ET");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Jane Doe");
        assert!(runs[0].has_glyph_geometry());
    }

    #[test]
    fn test_kerned_gap_becomes_space() {
        let runs = runs_of("BT /F1 10 Tf 0 0 Td [(Jane) -300 (Doe)] TJ ET");
        assert_eq!(runs[0].text, "Jane Doe");
        assert!(runs[0].has_glyph_geometry());
        // synthesized space covers the gap
        let space = runs[0].glyphs[4].bounding_rect();
        assert_eq!(space.x0, 20.0);
        assert_eq!(space.x1, 23.0);
    }

    #[test]
    fn test_font_change_and_new_line_split_runs() {
        let runs = runs_of(
            "BT /F1 10 Tf 0 100 Td (ab) Tj /F2 10 Tf (cd) Tj 0 -20 Td (ef) Tj ET",
        );
        let summary: Vec<(&str, usize)> = runs.iter().map(|r| (r.text.as_str(), r.line)).collect();
        assert_eq!(summary, vec![("ab", 0), ("cd", 0), ("ef", 1)]);
    }

    #[test]
    fn test_blocks_split_runs() {
        let runs = runs_of("BT /F1 10 Tf 0 0 Td (ab) Tj ET BT /F1 10 Tf 10 0 Td (cd) Tj ET");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].block, 1);
    }

    #[test]
    fn test_search_spans_runs_of_a_line() {
        let runs = runs_of("BT /F1 10 Tf 0 0 Td (Jane) Tj /F2 10 Tf 50 0 Td (Doe) Tj ET");
        let lines = build_lines(&runs);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Jane Doe");

        let quads = search_lines(&lines, "Jane Doe");
        assert_eq!(quads.len(), 1);
        let rect = quads[0].bounding_rect();
        assert_eq!((rect.x0, rect.x1), (0.0, 65.0));
    }

    #[test]
    fn test_search_finds_every_occurrence_case_sensitive() {
        let runs = runs_of("BT /F1 10 Tf 0 0 Td (ab AB ab) Tj 0 -20 Td (xab) Tj ET");
        let lines = build_lines(&runs);
        assert_eq!(search_lines(&lines, "ab").len(), 3);
        assert_eq!(search_lines(&lines, "AB").len(), 1);
        assert!(search_lines(&lines, "b A").len() == 1);
        assert!(search_lines(&lines, "abx").is_empty());
        assert!(search_lines(&lines, "").is_empty());
    }
}
