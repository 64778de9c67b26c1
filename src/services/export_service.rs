use crate::error::Result;
use crate::models::attempt::AttemptSummary;
use crate::services::grading_service::{round_percentage, Grade};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::*;

pub struct ExportService;

impl ExportService {
    /// Generate a styled XLSX workbook from recent quiz attempts.
    pub fn generate_history_xlsx(attempts: &[AttemptSummary]) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Quiz History")?;

        // ── Color palette ──
        let primary_color = Color::RGB(0x1E293B);
        let header_bg = Color::RGB(0x0F172A);
        let header_text = Color::White;
        let alt_row_1 = Color::RGB(0xF8FAFC);
        let alt_row_2 = Color::White;
        let border_color = Color::RGB(0xE2E8F0);

        let grade_excellent = Color::RGB(0x10B981);
        let grade_good = Color::RGB(0x3B82F6);
        let grade_low = Color::RGB(0xF59E0B);

        let columns = [
            ("#", 8.0),
            ("ID", 10.0),
            ("Topic", 40.0),
            ("Difficulty", 14.0),
            ("Score", 12.0),
            ("Percentage", 14.0),
            ("Grade", 16.0),
            ("Taken At", 20.0),
        ];
        let last_col = (columns.len() - 1) as u16;

        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }

        // ── Title row ──
        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(header_text)
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(0, 40)?;
        worksheet.merge_range(0, 0, 0, last_col, "Quiz History", &title_format)?;

        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(1, 22)?;
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
        let subtitle_text = format!("Exported: {}  •  Attempts: {}", now, attempts.len());
        worksheet.merge_range(1, 0, 1, last_col, &subtitle_text, &subtitle_format)?;

        // ── Header row ──
        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(header_text)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);

        let header_row = 2;
        worksheet.set_row_height(header_row, 30)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(header_row, i as u16, *name, &header_format)?;
        }

        // ── Data rows ──
        let data_start_row = 3;
        for (idx, attempt) in attempts.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let bg = if idx % 2 == 0 { alt_row_1 } else { alt_row_2 };

            let base_fmt = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);

            worksheet.set_row_height(row, 22)?;
            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_number_with_format(row, 1, attempt.id as f64, &center_fmt)?;
            worksheet.write_string_with_format(row, 2, &attempt.topic, &base_fmt.clone().set_bold())?;
            worksheet.write_string_with_format(row, 3, attempt.difficulty.label(), &center_fmt)?;

            let score = format!("{}/{}", attempt.raw_score, attempt.question_count);
            worksheet.write_string_with_format(row, 4, &score, &center_fmt)?;

            let pct_fmt = center_fmt.clone().set_num_format("0.00");
            worksheet.write_number_with_format(
                row,
                5,
                attempt.percentage.to_f64().unwrap_or_default(),
                &pct_fmt,
            )?;

            let grade_color = match Grade::from_percentage(attempt.percentage) {
                Grade::Excellent => grade_excellent,
                Grade::Good => grade_good,
                Grade::KeepLearning => grade_low,
            };
            let grade_fmt = Format::new()
                .set_font_size(10)
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(grade_color)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            worksheet.write_string_with_format(row, 6, &attempt.grade, &grade_fmt)?;

            let taken = attempt.created_at.format("%Y-%m-%d %H:%M").to_string();
            worksheet.write_string_with_format(row, 7, &taken, &center_fmt)?;
        }

        // ── Summary row ──
        let total_row = data_start_row + attempts.len() as u32 + 1;
        let summary_fmt = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(primary_color)
            .set_background_color(Color::RGB(0xE0E7FF))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);

        let (average, best) = Self::summarize(attempts);
        worksheet.set_row_height(total_row, 26)?;
        worksheet.merge_range(
            total_row,
            0,
            total_row,
            3,
            &format!("Total: {} attempts", attempts.len()),
            &summary_fmt,
        )?;
        worksheet.merge_range(
            total_row,
            4,
            total_row,
            last_col,
            &format!("Average: {}%  |  Best: {}%", average, best),
            &summary_fmt,
        )?;

        worksheet.set_freeze_panes(3, 0)?;
        worksheet.autofilter(
            2,
            0,
            (data_start_row + attempts.len() as u32).saturating_sub(1).max(2),
            last_col,
        )?;

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }

    fn summarize(attempts: &[AttemptSummary]) -> (Decimal, Decimal) {
        if attempts.is_empty() {
            return (round_percentage(Decimal::ZERO), round_percentage(Decimal::ZERO));
        }
        let total: Decimal = attempts.iter().map(|a| a.percentage).sum();
        let best = attempts
            .iter()
            .map(|a| a.percentage)
            .max()
            .unwrap_or(Decimal::ZERO);
        (
            round_percentage(total / Decimal::from(attempts.len() as i64)),
            round_percentage(best),
        )
    }
}
