use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rgb,
};

use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::question::option_letter;
use crate::services::grading_service::{Grade, GradingService};

const PAGE_WIDTH: Mm = Mm(215.9);
const PAGE_HEIGHT: Mm = Mm(279.4);
const MARGIN: f32 = 12.7;
const QUESTIONS_PER_PAGE: usize = 3;
// Helvetica averages roughly half an em per glyph
const AVG_GLYPH_EM: f32 = 0.5;
const PT_PER_MM: f32 = 72.0 / 25.4;

fn rgb(hex: u32) -> Color {
    let channel = |shift: u32| ((hex >> shift) & 0xFF) as f32 / 255.0;
    Color::Rgb(Rgb::new(channel(16), channel(8), channel(0), None))
}

/// Built-in PDF fonts only render plain ASCII reliably.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            c if c.is_whitespace() => ' ',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

fn wrap(text: &str, font_size: f32, width_mm: f32) -> Vec<String> {
    let max_chars = ((width_mm * PT_PER_MM) / (font_size * AVG_GLYPH_EM)).max(10.0) as usize;
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let needed = if line.is_empty() { word.len() } else { line.len() + 1 + word.len() };
        if needed > max_chars && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if word.len() > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max_chars) {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                line = chunk.iter().collect();
            }
            continue;
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, "content");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| Error::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| Error::Render(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: PAGE_HEIGHT.0 - MARGIN,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "content");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT.0 - MARGIN;
    }

    fn space(&mut self, mm: f32) {
        self.cursor -= mm;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, indent: f32, color: Option<Color>) {
        let line_height = size * 0.45;
        let width = PAGE_WIDTH.0 - 2.0 * MARGIN - indent;
        for line in wrap(&pdf_safe(text), size, width) {
            if self.cursor - line_height < MARGIN {
                self.new_page();
            }
            self.cursor -= line_height;
            if let Some(c) = &color {
                self.layer.set_fill_color(c.clone());
            }
            let font = if bold { &self.bold } else { &self.regular };
            self.layer
                .use_text(line, size, Mm(MARGIN + indent), Mm(self.cursor), font);
            if color.is_some() {
                self.layer.set_fill_color(rgb(0x000000));
            }
        }
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| Error::Render(e.to_string()))
    }
}

pub struct ReportService;

impl ReportService {
    /// Rejects attempts whose payload cannot back a consistent report.
    pub fn validate(attempt: &Attempt) -> Result<()> {
        let quiz = &attempt.payload.quiz;
        let count = usize::try_from(attempt.question_count).unwrap_or(0);
        if quiz.len() != count || count == 0 {
            return Err(Error::Render(format!(
                "payload holds {} questions but the attempt records {}",
                quiz.len(),
                attempt.question_count
            )));
        }
        for (idx, q) in quiz.questions.iter().enumerate() {
            q.check()
                .map_err(|e| Error::Render(format!("question {}: {}", idx + 1, e)))?;
        }
        for (position, option) in attempt.payload.answers.iter() {
            let question = quiz.questions.get(position).ok_or_else(|| {
                Error::Render(format!("answer for missing question {}", position + 1))
            })?;
            if option >= question.options.len() {
                return Err(Error::Render(format!(
                    "answer {} for question {} is not an option",
                    option,
                    position + 1
                )));
            }
        }
        Ok(())
    }

    pub fn render_pdf(attempt: &Attempt) -> Result<Vec<u8>> {
        Self::validate(attempt)?;

        let quiz = &attempt.payload.quiz;
        let grade = Grade::from_percentage(attempt.percentage).label();
        let mut w = PageWriter::new(&format!("Quiz Results - {}", pdf_safe(&attempt.topic)))?;

        w.text("AI Quiz Results", 24.0, true, 0.0, Some(rgb(0x1F77B4)));
        w.space(6.0);

        let percentage = attempt.percentage.round_dp(1);
        let info = [
            ("Topic:", attempt.topic.clone()),
            ("Difficulty:", attempt.difficulty.label().to_string()),
            ("Date:", attempt.created_at.format("%Y-%m-%d %H:%M UTC").to_string()),
            (
                "Score:",
                format!("{}/{}", attempt.raw_score, attempt.question_count),
            ),
            ("Percentage:", format!("{:.1}%", percentage)),
        ];
        for (label, value) in info {
            w.text(&format!("{} {}", label, value), 11.0, false, 0.0, None);
            w.space(1.5);
        }
        w.space(6.0);

        let grade_color = match Grade::from_percentage(attempt.percentage) {
            Grade::Excellent => rgb(0x2E7D32),
            Grade::Good => rgb(0x1565C0),
            Grade::KeepLearning => rgb(0xEF6C00),
        };
        w.text(grade, 16.0, true, 0.0, Some(grade_color));
        w.space(8.0);

        w.text("Detailed Results", 14.0, true, 0.0, Some(rgb(0x2C3E50)));
        w.space(3.0);

        let graded = GradingService::breakdown(quiz, &attempt.payload.answers);
        for (idx, item) in graded.iter().enumerate() {
            w.text(
                &format!("Question {}: {}", item.position, item.question),
                11.0,
                true,
                0.0,
                None,
            );
            w.space(2.0);

            for (opt_idx, option) in item.options.iter().enumerate() {
                let is_correct = opt_idx == item.correct_answer;
                let is_chosen = item.chosen_answer == Some(opt_idx);
                let note = match (is_correct, is_chosen) {
                    (true, true) => "  (Your answer - Correct!)",
                    (true, false) => "  (Correct answer)",
                    (false, true) => "  (Your answer - Incorrect)",
                    (false, false) => "",
                };
                let color = match (is_correct, is_chosen) {
                    (true, _) => Some(rgb(0x2E7D32)),
                    (false, true) => Some(rgb(0xC62828)),
                    _ => None,
                };
                w.text(
                    &format!("{}. {}{}", option_letter(opt_idx), option, note),
                    10.0,
                    is_chosen || is_correct,
                    6.0,
                    color,
                );
                w.space(1.0);
            }
            if item.chosen_answer.is_none() {
                w.text("(No answer recorded)", 10.0, false, 6.0, None);
            }

            if let Some(explanation) = &item.explanation {
                w.space(1.5);
                w.text(&format!("Explanation: {}", explanation), 10.0, false, 0.0, None);
            }
            w.space(6.0);

            if (idx + 1) % QUESTIONS_PER_PAGE == 0 && idx + 1 < graded.len() {
                w.new_page();
            }
        }

        let bytes = w.finish()?;
        tracing::debug!(attempt_id = attempt.id, bytes = bytes.len(), "rendered PDF report");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::{AnswerRecord, AttemptPayload};
    use crate::models::question::{Difficulty, Question, Quiz};
    use crate::services::grading_service::percentage_of;
    use chrono::Utc;

    fn attempt(n: usize, answers: AnswerRecord) -> Attempt {
        let quiz = Quiz {
            topic: "Cell Biology".into(),
            difficulty: Difficulty::Hard,
            questions: (0..n)
                .map(|i| Question {
                    question: format!(
                        "Which organelle is described by statement number {} in this rather long prompt that must wrap across lines?",
                        i + 1
                    ),
                    options: vec![
                        "Mitochondrion".into(),
                        "Ribosome".into(),
                        "Golgi apparatus".into(),
                        "Lysosome".into(),
                    ],
                    correct_answer: i % 4,
                    explanation: (i % 2 == 0).then(|| "Textbook definition.".to_string()),
                })
                .collect(),
        };
        let score = GradingService::score(&quiz, &answers);
        Attempt {
            id: 42,
            topic: quiz.topic.clone(),
            difficulty: quiz.difficulty,
            question_count: n as i32,
            raw_score: score.raw,
            percentage: percentage_of(score.raw, n as i32),
            payload: AttemptPayload { quiz, answers },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let answers: AnswerRecord = (0..7).map(|i| (i, 0)).collect();
        let bytes = ReportService::render_pdf(&attempt(7, answers)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn renders_every_grade_band() {
        // question i is correct at i % 4
        for (answers, grade) in [
            (vec![0, 1, 2, 3, 0], Grade::Excellent),
            (vec![0, 1, 2, 0, 1], Grade::Good),
            (vec![1, 0, 0, 0, 1], Grade::KeepLearning),
        ] {
            let record: AnswerRecord = answers.into_iter().enumerate().collect();
            let a = attempt(5, record);
            assert_eq!(Grade::from_percentage(a.percentage), grade);
            let bytes = ReportService::render_pdf(&a).unwrap();
            assert!(bytes.starts_with(b"%PDF"));
        }
    }

    #[test]
    fn rejects_answers_for_missing_questions() {
        let answers: AnswerRecord = [(0, 0), (5, 1)].into_iter().collect();
        let err = ReportService::render_pdf(&attempt(2, answers)).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut a = attempt(2, AnswerRecord::new());
        a.question_count = 3;
        assert!(matches!(ReportService::validate(&a), Err(Error::Render(_))));
    }

    #[test]
    fn wraps_long_text() {
        let lines = wrap(&"word ".repeat(200), 10.0, 100.0);
        assert!(lines.len() > 1);
        let max = lines.iter().map(String::len).max().unwrap();
        assert!(max <= ((100.0 * PT_PER_MM) / (10.0 * AVG_GLYPH_EM)) as usize);
    }

    #[test]
    fn replaces_unsupported_glyphs() {
        assert_eq!(pdf_safe("caf\u{e9} \u{2014} \u{1F9E0}"), "caf? - ?");
    }
}
