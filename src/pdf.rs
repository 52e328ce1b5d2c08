use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Polygon,
    Rgb,
};
use qrcode::{Color as ModuleColor, QrCode};

use crate::models::{ExamType, StudentProfile};

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN: f64 = 18.0;
const SIGNATURE_COLUMN: f64 = 120.0;
const ROW_STEP: f64 = 8.0;
// Lowest y a course row may occupy; the signature block and QR sit below.
const TABLE_BOTTOM: f64 = 58.0;
const QR_SIZE: f64 = 32.0;
const SIGNATURE_RULE: &str = "________________________";

/// Lays out the printable docket and returns the finished PDF bytes.
/// Pure; no store access.
pub fn render_docket(
    institution: &str,
    student: &StudentProfile,
    courses: &[String],
    exam_type: ExamType,
    qr_payload: &str,
) -> anyhow::Result<Vec<u8>> {
    let title = format!("{} DOCKET", exam_type.as_str().to_uppercase());
    let (doc, first_page, first_layer) =
        PdfDocument::new(title.as_str(), Mm((PAGE_WIDTH) as f32), Mm((PAGE_HEIGHT) as f32), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut layer = doc.get_page(first_page).get_layer(first_layer);

    centered_text(&layer, institution, 16.0, PAGE_HEIGHT - 25.0, &bold);
    centered_text(&layer, &title, 14.0, PAGE_HEIGHT - 35.0, &bold);

    let mut y = PAGE_HEIGHT - 53.0;
    layer.use_text(
        format!("Name: {} {}", student.first_name, student.last_name),
        12.0,
        Mm((MARGIN) as f32),
        Mm((y) as f32),
        &regular,
    );
    y -= 7.0;
    layer.use_text(
        format!("Student Number: {}", student.student_number),
        12.0,
        Mm((MARGIN) as f32),
        Mm((y) as f32),
        &regular,
    );
    y -= 7.0;
    layer.use_text(
        format!("Programme: {}", student.programme_name),
        12.0,
        Mm((MARGIN) as f32),
        Mm((y) as f32),
        &regular,
    );

    y -= 14.0;
    y = table_header(&layer, y, &bold);
    for course in courses {
        if y < TABLE_BOTTOM {
            let (page, page_layer) = doc.add_page(Mm((PAGE_WIDTH) as f32), Mm((PAGE_HEIGHT) as f32), "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
            y = table_header(&layer, PAGE_HEIGHT - 30.0, &bold);
        }
        layer.use_text(course.as_str(), 11.0, Mm((MARGIN) as f32), Mm((y) as f32), &regular);
        layer.use_text(SIGNATURE_RULE, 11.0, Mm((SIGNATURE_COLUMN) as f32), Mm((y) as f32), &regular);
        y -= ROW_STEP;
    }

    y -= 10.0;
    if y < 30.0 {
        let (page, page_layer) = doc.add_page(Mm((PAGE_WIDTH) as f32), Mm((PAGE_HEIGHT) as f32), "Layer 1");
        layer = doc.get_page(page).get_layer(page_layer);
        y = PAGE_HEIGHT - 40.0;
    }
    layer.use_text(
        format!("Verification Officer: {}", SIGNATURE_RULE),
        10.0,
        Mm((MARGIN) as f32),
        Mm((y) as f32),
        &regular,
    );
    layer.use_text(
        format!("Student Signature: {}", SIGNATURE_RULE),
        10.0,
        Mm((SIGNATURE_COLUMN) as f32),
        Mm((y) as f32),
        &regular,
    );

    draw_qr(
        &layer,
        qr_payload,
        PAGE_WIDTH - MARGIN - QR_SIZE,
        12.0,
        QR_SIZE,
    )?;

    Ok(doc.save_to_bytes()?)
}

fn table_header(layer: &PdfLayerReference, y: f64, bold: &IndirectFontRef) -> f64 {
    layer.use_text("Course Name", 12.0, Mm((MARGIN) as f32), Mm((y) as f32), bold);
    layer.use_text(
        "Invigilator Signature",
        12.0,
        Mm((SIGNATURE_COLUMN) as f32),
        Mm((y) as f32),
        bold,
    );
    rule(layer, MARGIN, PAGE_WIDTH - MARGIN, y - 2.0);
    y - ROW_STEP
}

fn rule(layer: &PdfLayerReference, x0: f64, x1: f64, y: f64) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm((x0) as f32), Mm((y) as f32)), false),
            (Point::new(Mm((x1) as f32), Mm((y) as f32)), false),
        ],
        is_closed: false,
    });
}

// Builtin fonts expose no glyph metrics; the run width is approximated
// from the average Helvetica advance.
fn centered_text(layer: &PdfLayerReference, text: &str, size: f64, y: f64, font: &IndirectFontRef) {
    let width_mm = text.chars().count() as f64 * size * 0.5 * 0.3528;
    let x = ((PAGE_WIDTH - width_mm) / 2.0).max(MARGIN);
    layer.use_text(text, size as f32, Mm((x) as f32), Mm((y) as f32), font);
}

/// Dark modules are drawn as one filled polygon, one ring per module.
fn draw_qr(
    layer: &PdfLayerReference,
    payload: &str,
    x: f64,
    y: f64,
    size: f64,
) -> anyhow::Result<()> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|err| anyhow::anyhow!("QR encoding failed: {:?}", err))?;
    let width = code.width();
    let module = size / width as f64;

    let mut rings = Vec::new();
    for (index, color) in code.to_colors().into_iter().enumerate() {
        if color != ModuleColor::Dark {
            continue;
        }
        let col = (index % width) as f64;
        let row = (index / width) as f64;
        let x0 = x + col * module;
        let y1 = y + size - row * module;
        let y0 = y1 - module;
        rings.push(vec![
            (Point::new(Mm((x0) as f32), Mm((y0) as f32)), false),
            (Point::new(Mm((x0 + module) as f32), Mm((y0) as f32)), false),
            (Point::new(Mm((x0 + module) as f32), Mm((y1) as f32)), false),
            (Point::new(Mm((x0) as f32), Mm((y1) as f32)), false),
        ]);
    }

    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.add_polygon(Polygon {
        rings,
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn profile() -> StudentProfile {
        StudentProfile {
            id: Uuid::new_v4(),
            first_name: "Chanda".to_string(),
            last_name: "Mwila".to_string(),
            student_number: "CU-2021-014".to_string(),
            programme_id: Uuid::new_v4(),
            programme_name: "BSc Computer Science".to_string(),
        }
    }

    fn courses(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Course {}", i)).collect()
    }

    #[test]
    fn renders_pdf_bytes() {
        let bytes = render_docket(
            "Test University",
            &profile(),
            &courses(3),
            ExamType::Ca1,
            "CU-2021-014_ca1_deadbeefdeadbeef",
        )
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_course_lists_paginate() {
        let few = render_docket(
            "Test University",
            &profile(),
            &courses(2),
            ExamType::Exam,
            "CU-2021-014_exam_deadbeefdeadbeef",
        )
        .unwrap();
        let many = render_docket(
            "Test University",
            &profile(),
            &courses(60),
            ExamType::Exam,
            "CU-2021-014_exam_deadbeefdeadbeef",
        )
        .unwrap();
        assert!(many.len() > few.len());
    }

    #[test]
    fn renders_every_exam_type() {
        for exam_type in ExamType::ALL {
            let payload = format!("CU-2021-014_{}_deadbeefdeadbeef", exam_type);
            let bytes = render_docket(
                "Test University",
                &profile(),
                &courses(5),
                exam_type,
                &payload,
            )
            .unwrap();
            assert!(bytes.starts_with(b"%PDF"));
        }
    }
}
