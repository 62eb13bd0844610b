// Region-restricted text from the embedded text layer
use crate::types::{Page, Rect, WordBox};

/// Words whose baseline sits within this many units share a line.
pub const LINE_TOLERANCE: f32 = 3.0;

/// Reconstruct visible lines in reading order from word boxes.
pub fn words_to_text(words: &[&WordBox]) -> String {
    let mut sorted: Vec<&WordBox> = words.to_vec();
    sorted.sort_by(|a, b| {
        a.top
            .round()
            .total_cmp(&b.top.round())
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut lines: Vec<Vec<&WordBox>> = Vec::new();
    let mut current_top: Option<f32> = None;

    for word in sorted {
        match current_top {
            Some(top) if (word.top - top).abs() <= LINE_TOLERANCE => {
                if let Some(line) = lines.last_mut() {
                    line.push(word);
                }
            }
            _ => {
                current_top = Some(word.top);
                lines.push(vec![word]);
            }
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            line.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text ONLY from the given box, filtering words by their top-left corner.
/// This avoids grabbing the recorder header at the very top.
pub fn crop_text(page: &Page, bbox: &Rect) -> String {
    let region_words: Vec<&WordBox> = page
        .words
        .iter()
        .filter(|w| bbox.contains(w.x0, w.top))
        .collect();

    if region_words.is_empty() {
        return String::new();
    }

    words_to_text(&region_words).trim().to_string()
}
