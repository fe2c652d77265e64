use chrono::NaiveDate;

use crate::calc;
use crate::rubric::{Criterion, Grille, Mastery};
use crate::session::{CandidateInfo, EvaluationState, JuryInfo};

// ── Minimal PDF writer ─────────────────────────────────────────────
//
// Landscape A4, Type1 Helvetica/Helvetica-Bold with WinAnsi encoding,
// uncompressed content streams. The drawing API works in millimetres with a
// top-left origin; conversion to PDF points happens at emit time.

pub const PAGE_W: f64 = 297.0;
pub const PAGE_H: f64 = 210.0;
const MM_TO_PT: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Helvetica,
    HelveticaBold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Helvetica => "/F1",
            Font::HelveticaBold => "/F2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectStyle {
    Stroke,
    FillStroke,
}

#[derive(Debug)]
pub struct Pdf {
    pages: Vec<String>,
    fill: [u8; 3],
    stroke: [u8; 3],
    text_color: [u8; 3],
    line_width: f64,
}

fn pt(v: f64) -> String {
    format!("{:.2}", v * MM_TO_PT)
}

fn flip_y(y: f64) -> String {
    pt(PAGE_H - y)
}

fn color(c: [u8; 3]) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        c[0] as f64 / 255.0,
        c[1] as f64 / 255.0,
        c[2] as f64 / 255.0
    )
}

impl Pdf {
    pub fn new() -> Pdf {
        Pdf {
            pages: vec![String::new()],
            fill: [0, 0, 0],
            stroke: [0, 0, 0],
            text_color: [0, 0, 0],
            line_width: 0.3,
        }
    }

    pub fn add_page(&mut self) {
        self.pages.push(String::new());
    }

    pub fn set_fill_color(&mut self, r: u8, g: u8, b: u8) {
        self.fill = [r, g, b];
    }

    pub fn set_draw_color(&mut self, r: u8, g: u8, b: u8) {
        self.stroke = [r, g, b];
    }

    pub fn set_text_color(&mut self, r: u8, g: u8, b: u8) {
        self.text_color = [r, g, b];
    }

    pub fn set_line_width(&mut self, mm: f64) {
        self.line_width = mm;
    }

    fn ops(&mut self) -> &mut String {
        self.pages.last_mut().expect("document always has a page")
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: RectStyle) {
        let fill = color(self.fill);
        let stroke = color(self.stroke);
        let lw = pt(self.line_width);
        let op = match style {
            RectStyle::Stroke => "S",
            RectStyle::FillStroke => "B",
        };
        let body = format!(
            "{} rg {} RG {} w {} {} {} {} re {}\n",
            fill,
            stroke,
            lw,
            pt(x),
            flip_y(y + h),
            pt(w),
            pt(h),
            op
        );
        self.ops().push_str(&body);
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let stroke = color(self.stroke);
        let lw = pt(self.line_width);
        let body = format!(
            "{} RG {} w {} {} m {} {} l S\n",
            stroke,
            lw,
            pt(x1),
            flip_y(y1),
            pt(x2),
            flip_y(y2)
        );
        self.ops().push_str(&body);
    }

    /// Draws one line of text with its baseline at `y`.
    pub fn text(&mut self, s: &str, x: f64, y: f64, font: Font, size: f64) {
        let fill = color(self.text_color);
        let body = format!(
            "BT {} rg {} {:.2} Tf {} {} Td ({}) Tj ET\n",
            fill,
            font.resource(),
            size,
            pt(x),
            flip_y(y),
            encode_text(s)
        );
        self.ops().push_str(&body);
    }

    pub fn text_centered(&mut self, s: &str, cx: f64, y: f64, font: Font, size: f64) {
        let x = cx - text_width(s, font, size) / 2.0;
        self.text(s, x, y, font, size);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let page_count = self.pages.len();
        let kids = (0..page_count)
            .map(|i| format!("{} 0 R", 5 + 2 * i))
            .collect::<Vec<_>>()
            .join(" ");

        let mut objects: Vec<Vec<u8>> = Vec::new();
        objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
        objects.push(
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count).into_bytes(),
        );
        objects.push(
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        );
        objects.push(
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        );
        for (i, ops) in self.pages.iter().enumerate() {
            objects.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                    PAGE_W * MM_TO_PT,
                    PAGE_H * MM_TO_PT,
                    6 + 2 * i
                )
                .into_bytes(),
            );
            let mut stream = format!("<< /Length {} >>\nstream\n", ops.len()).into_bytes();
            stream.extend_from_slice(ops.as_bytes());
            stream.extend_from_slice(b"\nendstream");
            objects.push(stream);
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = vec![0usize; objects.len() + 1];
        for (i, obj) in objects.iter().enumerate() {
            offsets[i + 1] = out.len();
            out.extend(format!("{} 0 obj\n", i + 1).into_bytes());
            out.extend_from_slice(obj);
            out.extend_from_slice(b"\nendobj\n");
        }
        let xref_pos = out.len();
        out.extend(format!("xref\n0 {}\n", objects.len() + 1).into_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            out.extend(format!("{:010} 00000 n \n", offset).into_bytes());
        }
        out.extend(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_pos
            )
            .into_bytes(),
        );
        out
    }
}

impl Default for Pdf {
    fn default() -> Self {
        Pdf::new()
    }
}

/// PDF string literal escaping over WinAnsi bytes; characters outside
/// Latin-1 degrade to '?'.
fn encode_text(s: &str) -> String {
    let mut out = String::new();
    for ch in s.chars() {
        let cp = ch as u32;
        let byte: u8 = if cp <= 0xFF { cp as u8 } else { b'?' };
        match byte {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03o}", byte)),
        }
    }
    out
}

// AFM advance widths (units per 1000) for the printable ASCII range.
#[rustfmt::skip]
const WIDTHS_HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const WIDTHS_HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333,
    584, 584, 584, 611, 975, 722, 722, 722, 722, 667, 611, 778, 722, 278,
    556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556,
    333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Accented Latin-1 characters advance like their base letter.
fn fold_accent(ch: char) -> char {
    match ch {
        'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' => 'i',
        'ô' | 'ö' => 'o',
        'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'À' | 'Â' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Î' | 'Ï' => 'I',
        'Ô' | 'Ö' => 'O',
        'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        _ => ch,
    }
}

fn char_width_units(ch: char, font: Font) -> u16 {
    let folded = fold_accent(ch);
    let cp = folded as u32;
    if (0x20..=0x7E).contains(&cp) {
        let idx = (cp - 0x20) as usize;
        match font {
            Font::Helvetica => WIDTHS_HELVETICA[idx],
            Font::HelveticaBold => WIDTHS_HELVETICA_BOLD[idx],
        }
    } else {
        556
    }
}

/// Advance width of a single line, in millimetres.
pub fn text_width(s: &str, font: Font, size: f64) -> f64 {
    let units: u32 = s.chars().map(|c| char_width_units(c, font) as u32).sum();
    units as f64 / 1000.0 * size / MM_TO_PT
}

/// Baseline-to-baseline advance, shared by measurement and drawing.
pub fn line_height(size: f64) -> f64 {
    size * 0.38
}

/// Greedy word wrap to a column width; a single word wider than the column
/// is hard-broken rather than clipped.
pub fn wrap_text(text: &str, font: Font, size: f64, max_w: f64) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        for word in para.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(&candidate, font, size) <= max_w {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if text_width(word, font, size) <= max_w {
                line = word.to_string();
            } else {
                for ch in word.chars() {
                    line.push(ch);
                    if text_width(&line, font, size) > max_w && line.chars().count() > 1 {
                        let carried = line.pop().expect("non-empty line");
                        lines.push(std::mem::take(&mut line));
                        line.push(carried);
                    }
                }
            }
        }
        lines.push(line);
    }
    while lines.len() > 1 && lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

fn measure_text_height(text: &str, font: Font, size: f64, max_w: f64) -> f64 {
    wrap_text(text, font, size, max_w).len() as f64 * line_height(size)
}

// ── Grid renderer ──────────────────────────────────────────────────

const MARGIN: f64 = 10.0;
const CONTENT_W: f64 = PAGE_W - 2.0 * MARGIN;

// Column widths: criterion title, four mastery levels, score bar.
const COL_CRIT: f64 = 48.0;
const COL_LEVEL: f64 = 52.0;
const COL_BAR: f64 = 21.0;
const COL_W: [f64; 6] = [COL_CRIT, COL_LEVEL, COL_LEVEL, COL_LEVEL, COL_LEVEL, COL_BAR];

fn col_x(i: usize) -> f64 {
    MARGIN + COL_W[..i].iter().sum::<f64>()
}

const GRAY_HEADER: [u8; 3] = [70, 70, 70];
const GRAY_SECTION: [u8; 3] = [235, 235, 235];
const GRAY_TOTAL: [u8; 3] = [240, 240, 240];

fn highlight_color(mastery: Mastery) -> [u8; 3] {
    match mastery {
        Mastery::Insufficient => [254, 226, 226],
        Mastery::Fragile => [255, 237, 213],
        Mastery::Satisfactory => [219, 234, 254],
        Mastery::Excellent => [220, 252, 231],
    }
}

const DESC_FONT: f64 = 7.0;
const POINTS_FONT: f64 = 7.0;
const CELL_PAD: f64 = 2.0;
const POINTS_ROW_H: f64 = 5.0;
const FOOTER_GUARD: f64 = 15.0;

const HEADER_LABELS: [&str; 6] = [
    "Criteres d'evaluation",
    "Maitrise insuffisante",
    "Maitrise fragile",
    "Maitrise satisfaisante",
    "Tres bonne maitrise",
    "Bareme",
];

struct GridPainter<'a> {
    doc: &'a mut Pdf,
    y: f64,
}

impl<'a> GridPainter<'a> {
    fn text_lines(&mut self, lines: &[String], x: f64, top: f64, font: Font, size: f64) {
        for (i, line) in lines.iter().enumerate() {
            self.doc
                .text(line, x, top + i as f64 * line_height(size), font, size);
        }
    }

    fn table_header(&mut self) {
        let hh = 8.0;
        self.doc.set_fill_color(GRAY_HEADER[0], GRAY_HEADER[1], GRAY_HEADER[2]);
        self.doc.set_draw_color(0, 0, 0);
        self.doc.set_text_color(255, 255, 255);
        for i in 0..6 {
            self.doc
                .rect(col_x(i), self.y, COL_W[i], hh, RectStyle::FillStroke);
            self.doc.text_centered(
                HEADER_LABELS[i],
                col_x(i) + COL_W[i] / 2.0,
                self.y + 5.0,
                Font::HelveticaBold,
                7.5,
            );
        }
        self.doc.set_text_color(0, 0, 0);
        self.y += hh;
    }

    fn section_header(&mut self, title: &str) {
        let hh = 7.0;
        self.doc
            .set_fill_color(GRAY_SECTION[0], GRAY_SECTION[1], GRAY_SECTION[2]);
        self.doc
            .rect(MARGIN, self.y, CONTENT_W, hh, RectStyle::FillStroke);
        self.doc
            .text(title, MARGIN + 2.0, self.y + 5.0, Font::HelveticaBold, 9.0);
        self.y += hh;
    }

    fn criterion_row(&mut self, criterion: &Criterion, selected: Option<f64>) {
        let title = format!("- {}", criterion.title);
        let crit_height =
            measure_text_height(&title, Font::HelveticaBold, DESC_FONT, COL_W[0] - 4.0);
        let max_desc_h = criterion
            .levels
            .iter()
            .map(|l| measure_text_height(&l.description, Font::Helvetica, DESC_FONT, COL_W[1] - 4.0))
            .fold(crit_height, f64::max);
        let row_h = max_desc_h + POINTS_ROW_H + CELL_PAD * 2.0 + 2.0;

        if self.y + row_h > PAGE_H - FOOTER_GUARD {
            self.doc.add_page();
            self.y = MARGIN;
            self.table_header();
        }

        let row_top = self.y;
        let is_level_selected = |idx: usize, points: f64| {
            selected
                .map(|s| s == points || (idx == 0 && s == 0.0))
                .unwrap_or(false)
        };

        self.doc.set_draw_color(0, 0, 0);
        for i in 0..6 {
            let fill = if (1..=4).contains(&i) {
                let level = &criterion.levels[i - 1];
                if is_level_selected(i - 1, level.points) {
                    Some(highlight_color(level.mastery))
                } else {
                    None
                }
            } else {
                None
            };
            match fill {
                Some(c) => {
                    self.doc.set_fill_color(c[0], c[1], c[2]);
                    self.doc
                        .rect(col_x(i), row_top, COL_W[i], row_h, RectStyle::FillStroke);
                }
                None => self
                    .doc
                    .rect(col_x(i), row_top, COL_W[i], row_h, RectStyle::Stroke),
            }
        }

        self.doc.set_text_color(0, 0, 0);
        let title_lines = wrap_text(&title, Font::HelveticaBold, DESC_FONT, COL_W[0] - 4.0);
        self.text_lines(
            &title_lines,
            col_x(0) + 2.0,
            row_top + CELL_PAD + 3.0,
            Font::HelveticaBold,
            DESC_FONT,
        );
        for (li, level) in criterion.levels.iter().enumerate() {
            let lines = wrap_text(&level.description, Font::Helvetica, DESC_FONT, COL_W[li + 1] - 4.0);
            self.text_lines(
                &lines,
                col_x(li + 1) + 2.0,
                row_top + CELL_PAD + 3.0,
                Font::Helvetica,
                DESC_FONT,
            );
        }

        let points_y = row_top + row_h - POINTS_ROW_H - 1.0;
        for (li, level) in criterion.levels.iter().enumerate() {
            let col = li + 1;
            let label = format!(
                "{} point{}",
                calc::fmt_pt(level.points),
                if level.points > 1.0 { "s" } else { "" }
            );
            if is_level_selected(li, level.points) {
                let tw = text_width(&label, Font::HelveticaBold, POINTS_FONT) + 4.0;
                let bx = col_x(col) + COL_W[col] - tw - 2.0;
                let c = highlight_color(level.mastery);
                self.doc.set_fill_color(c[0], c[1], c[2]);
                self.doc
                    .rect(bx, points_y - 1.0, tw, 5.0, RectStyle::FillStroke);
                self.doc
                    .text(&label, bx + 2.0, points_y + 2.5, Font::HelveticaBold, POINTS_FONT);
            } else {
                let tw = text_width(&label, Font::Helvetica, POINTS_FONT);
                let tx = col_x(col) + COL_W[col] - tw - 3.0;
                self.doc
                    .text(&label, tx, points_y + 2.5, Font::Helvetica, POINTS_FONT);
                self.doc.set_line_width(0.2);
                self.doc
                    .line(tx - 0.5, points_y + 3.5, tx + tw + 0.5, points_y + 3.5);
                self.doc.set_line_width(0.3);
            }
        }

        self.doc.text_centered(
            &format!("/{}", calc::fmt_pt(criterion.max_points)),
            col_x(5) + COL_W[5] / 2.0,
            row_top + row_h / 2.0 + 1.0,
            Font::Helvetica,
            9.0,
        );

        self.y += row_h;
    }

    fn subtotal_row(&mut self, label: &str, max_pts: f64, actual: Option<f64>) {
        let hh = 8.0;
        self.doc.set_draw_color(0, 0, 0);
        self.doc
            .rect(MARGIN, self.y, CONTENT_W, hh, RectStyle::Stroke);
        self.doc
            .text(label, MARGIN + 2.0, self.y + 5.5, Font::HelveticaBold, 9.0);
        let score_text = match actual {
            Some(v) => format!("{}   /{}", calc::fmt_pt(v), calc::fmt_pt(max_pts)),
            None => format!("/{}", calc::fmt_pt(max_pts)),
        };
        self.doc.text_centered(
            &score_text,
            col_x(5) + COL_W[5] / 2.0,
            self.y + 5.5,
            Font::HelveticaBold,
            9.0,
        );
        self.y += hh;
    }

    fn total_row(&mut self, total: f64, max_pts: f64) {
        let hh = 8.0;
        self.doc
            .set_fill_color(GRAY_TOTAL[0], GRAY_TOTAL[1], GRAY_TOTAL[2]);
        self.doc
            .rect(MARGIN, self.y, CONTENT_W, hh, RectStyle::FillStroke);
        self.doc
            .text("Total points", MARGIN + 2.0, self.y + 5.5, Font::HelveticaBold, 10.0);
        self.doc.text_centered(
            &format!("{}   /{}", calc::fmt_pt(total), calc::fmt_pt(max_pts)),
            col_x(5) + COL_W[5] / 2.0,
            self.y + 5.5,
            Font::HelveticaBold,
            10.0,
        );
        self.y += hh;
    }

    fn remarks(&mut self, comments: &str) {
        if comments.is_empty() {
            return;
        }
        self.y += 3.0;
        self.doc
            .text("Remarques :", MARGIN, self.y + 3.0, Font::HelveticaBold, 8.0);
        self.y += 5.0;
        let lines = wrap_text(comments, Font::Helvetica, 8.0, CONTENT_W);
        self.text_lines(&lines, MARGIN, self.y + 3.0, Font::Helvetica, 8.0);
        self.y += lines.len() as f64 * 3.5;
    }

    fn signatures(&mut self, jury: &JuryInfo) {
        let y = PAGE_H - 20.0;
        self.doc.text(
            &format!(
                "{} {} - signature Professeur 1",
                jury.prof1_prenom, jury.prof1_nom
            ),
            MARGIN + 20.0,
            y,
            Font::Helvetica,
            8.0,
        );
        self.doc.text(
            &format!(
                "{} {} - signature Professeur 2",
                jury.prof2_prenom, jury.prof2_nom
            ),
            PAGE_W - MARGIN - 80.0,
            y,
            Font::Helvetica,
            8.0,
        );
        self.doc.set_line_width(0.3);
        self.doc.set_draw_color(0, 0, 0);
        self.doc.line(MARGIN + 10.0, y + 8.0, MARGIN + 100.0, y + 8.0);
        self.doc
            .line(PAGE_W - MARGIN - 100.0, y + 8.0, PAGE_W - MARGIN - 10.0, y + 8.0);
    }
}

/// Renders one candidate as a per-section page sequence into an open
/// document.
fn render_candidate(doc: &mut Pdf, grille: &Grille, state: &EvaluationState, first: bool) {
    if !first {
        doc.add_page();
    }
    let mut painter = GridPainter { doc, y: MARGIN };

    painter.doc.set_text_color(0, 0, 0);
    painter.doc.text_centered(
        &format!(
            "Grille d'evaluation de l'epreuve orale de 3eme - {}",
            grille.session
        ),
        PAGE_W / 2.0,
        painter.y + 5.0,
        Font::HelveticaBold,
        14.0,
    );
    painter.y += 10.0;

    painter.doc.text(
        &format!("CANDIDAT : {}", state.candidate.nom),
        MARGIN + 10.0,
        painter.y + 5.0,
        Font::HelveticaBold,
        10.0,
    );
    painter.doc.text(
        &format!("PRENOM : {}", state.candidate.prenom),
        PAGE_W / 2.0 - 20.0,
        painter.y + 5.0,
        Font::HelveticaBold,
        10.0,
    );
    painter.doc.text(
        &format!("Classe : {}", state.candidate.classe),
        PAGE_W - MARGIN - 40.0,
        painter.y + 5.0,
        Font::HelveticaBold,
        10.0,
    );
    painter.y += 7.0;

    painter.doc.text(
        &format!("Jury : {}", state.jury.jury_number),
        MARGIN + 50.0,
        painter.y + 4.0,
        Font::Helvetica,
        9.0,
    );
    painter.doc.text(
        &format!("Horaires : {}", state.candidate.horaire),
        PAGE_W / 2.0 - 20.0,
        painter.y + 4.0,
        Font::Helvetica,
        9.0,
    );
    painter.doc.text(
        &format!("Salle : {}", state.jury.salle),
        PAGE_W / 2.0 + 40.0,
        painter.y + 4.0,
        Font::Helvetica,
        9.0,
    );
    painter.y += 8.0;

    for (si, section) in grille.sections.iter().enumerate() {
        if si > 0 {
            painter.doc.add_page();
            painter.y = MARGIN;
        }
        painter.table_header();
        painter.section_header(&section.title);
        for criterion in &section.criteria {
            painter.criterion_row(criterion, state.scores.get(&criterion.id).copied());
        }
        painter.subtotal_row(
            "Sous-total points",
            section.max_points,
            Some(calc::section_total(&state.scores, section.id)),
        );
    }

    painter.total_row(calc::grand_total(&state.scores), grille.total_points);
    painter.remarks(&state.comments);
    painter.signatures(&state.jury);
}

/// Builds the full document for one or many evaluations; each candidate
/// contributes one page per rubric section.
pub fn evaluation_document(grille: &Grille, states: &[EvaluationState]) -> Vec<u8> {
    let mut doc = Pdf::new();
    for (i, state) in states.iter().enumerate() {
        render_candidate(&mut doc, grille, state, i == 0);
    }
    doc.to_bytes()
}

pub fn single_filename(candidate: &CandidateInfo) -> String {
    format!("evaluation_{}_{}.pdf", candidate.nom, candidate.prenom)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn bulk_filename(date: NaiveDate) -> String {
    format!("evaluations_oral_dnb_{}.pdf", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric;

    fn scored_state(grille: &Grille, level_idx: usize) -> EvaluationState {
        let mut state = EvaluationState::default();
        state.candidate.nom = "Durand".to_string();
        state.candidate.prenom = "Alice".to_string();
        state.jury.jury_number = "2".to_string();
        for c in grille.criteria() {
            state.scores.insert(c.id.clone(), c.levels[level_idx].points);
        }
        state
    }

    fn count_occurrences(haystack: &[u8], needle: &str) -> usize {
        let needle = needle.as_bytes();
        haystack
            .windows(needle.len())
            .filter(|w| *w == needle)
            .count()
    }

    #[test]
    fn document_has_one_page_per_section_per_candidate() {
        let grille = rubric::builtin_2026();
        let one = evaluation_document(&grille, &[scored_state(&grille, 2)]);
        assert!(one.starts_with(b"%PDF-1.4"));
        assert_eq!(count_occurrences(&one, "/Type /Page /Parent"), 2);

        let states = vec![
            scored_state(&grille, 0),
            scored_state(&grille, 1),
            scored_state(&grille, 3),
        ];
        let bulk = evaluation_document(&grille, &states);
        assert_eq!(count_occurrences(&bulk, "/Type /Page /Parent"), 6);
    }

    #[test]
    fn awarded_levels_are_highlighted_with_their_band_color() {
        let grille = rubric::builtin_2026();
        // Excellent everywhere: expect the green highlight fill in the stream.
        let doc = evaluation_document(&grille, &[scored_state(&grille, 3)]);
        let green = color(highlight_color(Mastery::Excellent));
        assert!(count_occurrences(&doc, &format!("{} rg", green)) > 0);
        // No score on any insufficient band, so the red fill never appears.
        let red = color(highlight_color(Mastery::Insufficient));
        assert_eq!(count_occurrences(&doc, &format!("{} rg", red)), 0);
    }

    #[test]
    fn zero_score_highlights_the_first_band() {
        let grille = rubric::builtin_2026();
        let mut state = scored_state(&grille, 3);
        for c in grille.criteria() {
            state.scores.insert(c.id.clone(), 0.0);
        }
        let doc = evaluation_document(&grille, &[state]);
        let red = color(highlight_color(Mastery::Insufficient));
        assert!(count_occurrences(&doc, &format!("{} rg", red)) > 0);
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let grille = rubric::builtin_2026();
        let bytes = evaluation_document(&grille, &[scored_state(&grille, 1)]);
        let text = String::from_utf8_lossy(&bytes);
        let xref_pos: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|t| t.lines().next())
            .and_then(|l| l.trim().parse().ok())
            .expect("startxref offset");
        assert_eq!(&bytes[xref_pos..xref_pos + 4], b"xref");

        // Every recorded offset must land exactly on "<n> 0 obj".
        let table = &text[xref_pos..];
        for (i, line) in table.lines().skip(3).enumerate() {
            if !line.ends_with("n ") {
                break;
            }
            let offset: usize = line[..10].parse().expect("offset digits");
            let expected = format!("{} 0 obj", i + 1);
            assert_eq!(
                &text[offset..offset + expected.len()],
                expected,
                "object {} offset mismatch",
                i + 1
            );
        }
    }

    #[test]
    fn wrap_text_respects_column_width_and_breaks_long_words() {
        let sample = "Développe un exposé bien structuré, clair et qui respecte la durée minimum impartie";
        let lines = wrap_text(sample, Font::Helvetica, DESC_FONT, COL_LEVEL - 4.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, Font::Helvetica, DESC_FONT) <= COL_LEVEL - 4.0);
        }

        let narrow = wrap_text("incompréhensiblement", Font::Helvetica, 12.0, 8.0);
        assert!(narrow.len() > 1);
        for line in &narrow {
            assert!(text_width(line, Font::Helvetica, 12.0) <= 8.0);
        }
    }

    #[test]
    fn remarks_render_below_the_final_table() {
        let grille = rubric::builtin_2026();
        let mut state = scored_state(&grille, 2);
        state.comments = "Très long commentaire. ".repeat(40);
        let doc = evaluation_document(&grille, &[state]);
        assert_eq!(count_occurrences(&doc, "/Type /Page /Parent"), 2);
        assert!(count_occurrences(&doc, "Remarques :") > 0);
    }

    #[test]
    fn filenames_replace_whitespace() {
        let mut candidate = CandidateInfo::default();
        candidate.nom = "De La Tour".to_string();
        candidate.prenom = "Jean Paul".to_string();
        assert_eq!(single_filename(&candidate), "evaluation_De_La_Tour_Jean_Paul.pdf");
        let date = NaiveDate::from_ymd_opt(2026, 6, 12).expect("date");
        assert_eq!(bulk_filename(date), "evaluations_oral_dnb_2026-06-12.pdf");
    }
}
