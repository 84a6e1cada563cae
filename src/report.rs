use serde::Serialize;
use std::path::Path;

use crate::grading;
use crate::pdf::{self, Color, Font, JpegImage, PdfWriter, A4_HEIGHT, A4_WIDTH, INCH};
use crate::photos;
use crate::store::Student;

pub const REPORT_TITLE: &str = "Student Report Card";
const CHART_Y_MAX: f64 = 100.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRow {
    pub subject: String,
    pub mark: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBar {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub title: String,
    pub uid: String,
    /// Absolute path of the photo when the referenced file exists.
    pub photo_path: Option<String>,
    pub info: Vec<InfoRow>,
    pub marks: Vec<MarkRow>,
    pub chart: Vec<ChartBar>,
    pub chart_y_max: f64,
    pub default_file_name: String,
}

pub fn default_file_name(student: &Student) -> String {
    let raw = format!("{}_{}_Report.pdf", student.uid, student.name);
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub fn build_report_card(workspace: &Path, student: &Student) -> ReportCard {
    let avg = student.average();
    let info = [
        ("UID", student.uid.clone()),
        ("Name", student.name.clone()),
        ("Class", student.student_class.clone()),
        ("Section", student.section.clone()),
        (
            "Average",
            avg.map(grading::format_mark)
                .unwrap_or_else(|| "N/A".to_string()),
        ),
        ("Grade", grading::grade(avg).as_str().to_string()),
    ]
    .into_iter()
    .map(|(label, value)| InfoRow {
        label: label.to_string(),
        value,
    })
    .collect();

    let marks = student
        .subjects
        .iter()
        .map(|sm| MarkRow {
            subject: sm.subject.clone(),
            mark: grading::format_optional_mark(sm.mark),
        })
        .collect();

    let chart = student
        .subjects
        .iter()
        .filter_map(|sm| {
            sm.mark.map(|value| ChartBar {
                label: sm.subject.clone(),
                value,
            })
        })
        .collect();

    ReportCard {
        title: REPORT_TITLE.to_string(),
        uid: student.uid.clone(),
        photo_path: photos::resolve_photo(workspace, student.image_filename.as_deref())
            .map(|p| p.to_string_lossy().to_string()),
        info,
        marks,
        chart,
        chart_y_max: CHART_Y_MAX,
        default_file_name: default_file_name(student),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSummary {
    pub pages: usize,
    pub photo_embedded: bool,
    pub chart_drawn: bool,
    pub warnings: Vec<String>,
}

const MARGIN: f64 = 72.0;
const ROW_HEIGHT: f64 = 18.0;
const CELL_PAD: f64 = 6.0;
const BODY_SIZE: f64 = 10.0;
const GAP: f64 = 12.0;
const BAR_COLOR: Color = Color::rgb(0.122, 0.467, 0.706);

/// Vertical layout state: the current page and the top of the free space.
struct Cursor {
    page: usize,
    y: f64,
}

impl Cursor {
    fn reserve(&mut self, w: &mut PdfWriter, height: f64) {
        if self.y - height < MARGIN {
            self.page = w.add_page();
            self.y = A4_HEIGHT - MARGIN;
        }
    }
}

fn centered_x(width: f64) -> f64 {
    (A4_WIDTH - width) / 2.0
}

fn draw_table(
    w: &mut PdfWriter,
    cur: &mut Cursor,
    rows: &[[String; 2]],
    col_widths: [f64; 2],
    header_fill: Color,
) {
    let total: f64 = col_widths.iter().sum();
    let x0 = centered_x(total);
    for (i, row) in rows.iter().enumerate() {
        cur.reserve(w, ROW_HEIGHT);
        let top = cur.y;
        let bottom = top - ROW_HEIGHT;
        if i == 0 {
            w.fill_rect(cur.page, x0, bottom, total, ROW_HEIGHT, header_fill);
        }
        let mut x = x0;
        for (cell, width) in row.iter().zip(col_widths) {
            let text = pdf::fit_text(cell, BODY_SIZE, Font::Regular, width - 2.0 * CELL_PAD);
            w.text(cur.page, x + CELL_PAD, bottom + 5.5, BODY_SIZE, Font::Regular, &text);
            x += width;
        }
        w.line(cur.page, (x0, top), (x0 + total, top), 0.5, Color::GREY);
        w.line(cur.page, (x0, bottom), (x0 + total, bottom), 0.5, Color::GREY);
        let mut x = x0;
        w.line(cur.page, (x, top), (x, bottom), 0.5, Color::GREY);
        for width in col_widths {
            x += width;
            w.line(cur.page, (x, top), (x, bottom), 0.5, Color::GREY);
        }
        cur.y = bottom;
    }
    cur.y -= GAP;
}

fn draw_chart(w: &mut PdfWriter, cur: &mut Cursor, bars: &[ChartBar], y_max: f64) {
    let width = 6.5 * INCH;
    let height = 3.5 * INCH;
    cur.reserve(w, height);
    let page = cur.page;
    let x0 = centered_x(width);
    let bottom = cur.y - height;

    // Plot area inside the frame, leaving room for tick and subject labels.
    let left = x0 + 40.0;
    let right = x0 + width - 10.0;
    let plot_bottom = bottom + 30.0;
    let plot_top = cur.y - 10.0;
    let plot_h = plot_top - plot_bottom;
    let small = 8.0;

    for step in 0..=5 {
        let v = y_max * step as f64 / 5.0;
        let y = plot_bottom + plot_h * step as f64 / 5.0;
        w.line(page, (left - 3.0, y), (left, y), 0.5, Color::BLACK);
        let label = format!("{}", v.round() as i64);
        let lw = pdf::text_width(&label, small, Font::Regular);
        w.text(page, left - 5.0 - lw, y - 3.0, small, Font::Regular, &label);
    }
    w.text_vertical(
        page,
        x0 + 10.0,
        plot_bottom + plot_h / 2.0 - 12.0,
        BODY_SIZE,
        Font::Regular,
        "Marks",
    );

    let slot = (right - left) / bars.len().max(1) as f64;
    let bar_w = slot * 0.8;
    for (i, bar) in bars.iter().enumerate() {
        let clamped = bar.value.clamp(0.0, y_max);
        let h = plot_h * clamped / y_max;
        let x = left + slot * i as f64 + (slot - bar_w) / 2.0;
        w.fill_rect(page, x, plot_bottom, bar_w, h, BAR_COLOR);

        let value = grading::format_mark(bar.value);
        let vw = pdf::text_width(&value, small, Font::Regular);
        w.text(
            page,
            x + (bar_w - vw) / 2.0,
            plot_bottom + h + 3.0,
            small,
            Font::Regular,
            &value,
        );

        let label = pdf::fit_text(&bar.label, small, Font::Regular, slot - 2.0);
        let lw = pdf::text_width(&label, small, Font::Regular);
        w.text(
            page,
            x + (bar_w - lw) / 2.0,
            plot_bottom - 12.0,
            small,
            Font::Regular,
            &label,
        );
    }

    w.line(page, (left, plot_bottom), (right, plot_bottom), 0.8, Color::BLACK);
    w.line(page, (left, plot_bottom), (left, plot_top), 0.8, Color::BLACK);
    cur.y = bottom - GAP;
}

/// Lays the report card out on A4 pages and returns the PDF bytes.
pub fn render_pdf(card: &ReportCard, include_chart: bool) -> (Vec<u8>, RenderSummary) {
    let mut summary = RenderSummary::default();
    let mut w = PdfWriter::new(format!("{} - {}", card.title, card.uid));
    let mut cur = Cursor {
        page: w.add_page(),
        y: A4_HEIGHT - MARGIN,
    };

    let title_size = 18.0;
    let tw = pdf::text_width(&card.title, title_size, Font::Bold);
    w.text(
        cur.page,
        centered_x(tw),
        cur.y - title_size,
        title_size,
        Font::Bold,
        &card.title,
    );
    cur.y -= title_size + 6.0 + GAP;

    if let Some(photo) = card.photo_path.as_deref() {
        match JpegImage::open(Path::new(photo)) {
            Ok(img) => {
                let side = 1.6 * INCH;
                cur.reserve(&mut w, side);
                let id = w.add_image(img);
                w.image(cur.page, id, centered_x(side), cur.y - side, side, side);
                cur.y -= side + 8.0;
                summary.photo_embedded = true;
            }
            Err(e) => {
                tracing::warn!(uid = %card.uid, error = %e, "photo skipped in report");
                summary.warnings.push(format!("photo skipped: {e}"));
            }
        }
    }

    let info_rows = card
        .info
        .iter()
        .map(|r| [r.label.clone(), r.value.clone()])
        .collect::<Vec<_>>();
    draw_table(
        &mut w,
        &mut cur,
        &info_rows,
        [1.2 * INCH, 3.8 * INCH],
        Color::WHITE_SMOKE,
    );

    if !card.marks.is_empty() {
        let mark_rows = std::iter::once(["Subject".to_string(), "Marks".to_string()])
            .chain(card.marks.iter().map(|m| [m.subject.clone(), m.mark.clone()]))
            .collect::<Vec<_>>();
        draw_table(
            &mut w,
            &mut cur,
            &mark_rows,
            [3.0 * INCH, 2.0 * INCH],
            Color::LIGHT_GREY,
        );
    }

    if include_chart && !card.chart.is_empty() {
        draw_chart(&mut w, &mut cur, &card.chart, card.chart_y_max);
        summary.chart_drawn = true;
    }

    summary.pages = w.page_count();
    (w.finish(), summary)
}
